//! 传输层错误分类与构造辅助。
//!
//! # 教案级说明
//!
//! ## 意图（Why）
//! - 各传输实现统一以 [`CoreError`] 对外报告错误；调用方（注册表、连接管理器）需要一个
//!   比字符串码值更易匹配的视图，以决定“换下一个传输”还是“放弃”。
//!
//! ## 契约（What）
//! - [`TransportErrorKind::of`] 将错误码映射回枚举；未知码值返回 `None`；
//! - [`unsupported_address`]、[`closed`] 与 [`io_error`] 为实现方提供一致的构造入口，
//!   其中 `io_error` 按 `io::ErrorKind` 给出重试/超时分类。

use std::borrow::Cow;
use std::io;
use std::time::Duration;

use spark_core::error::{CoreError, ErrorCategory, codes};

use crate::multiaddr::Multiaddr;

/// 传输层错误种类。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TransportErrorKind {
    /// 地址形态不受支持；可尝试其他传输。
    UnsupportedAddress,
    /// 主机名解析失败。
    Resolution,
    /// 建连或握手失败。
    Dial,
    /// 绑定失败。
    Listen,
    /// 对象已关闭。
    Closed,
    /// 安全/多路复用升级失败。
    Upgrade,
    /// 底层 I/O 故障。
    Io,
    /// 调用被取消。
    Cancelled,
    /// 调用超时。
    Timeout,
}

impl TransportErrorKind {
    /// 根据错误码识别种类。
    pub fn of(err: &CoreError) -> Option<Self> {
        let kind = match err.code() {
            codes::TRANSPORT_UNSUPPORTED_ADDRESS => Self::UnsupportedAddress,
            codes::TRANSPORT_RESOLUTION => Self::Resolution,
            codes::TRANSPORT_DIAL => Self::Dial,
            codes::TRANSPORT_LISTEN => Self::Listen,
            codes::TRANSPORT_CLOSED => Self::Closed,
            codes::TRANSPORT_UPGRADE => Self::Upgrade,
            codes::TRANSPORT_IO => Self::Io,
            codes::TRANSPORT_CANCELLED => Self::Cancelled,
            codes::TRANSPORT_TIMEOUT => Self::Timeout,
            _ => return None,
        };
        Some(kind)
    }

    /// 对应的稳定错误码。
    pub fn code(self) -> &'static str {
        match self {
            Self::UnsupportedAddress => codes::TRANSPORT_UNSUPPORTED_ADDRESS,
            Self::Resolution => codes::TRANSPORT_RESOLUTION,
            Self::Dial => codes::TRANSPORT_DIAL,
            Self::Listen => codes::TRANSPORT_LISTEN,
            Self::Closed => codes::TRANSPORT_CLOSED,
            Self::Upgrade => codes::TRANSPORT_UPGRADE,
            Self::Io => codes::TRANSPORT_IO,
            Self::Cancelled => codes::TRANSPORT_CANCELLED,
            Self::Timeout => codes::TRANSPORT_TIMEOUT,
        }
    }
}

/// 构造“地址不受支持”错误。
///
/// `transport` 为拒绝该地址的传输名，便于在注册表日志中区分来源。
pub fn unsupported_address(transport: &str, addr: &Multiaddr) -> CoreError {
    CoreError::new(
        codes::TRANSPORT_UNSUPPORTED_ADDRESS,
        format!("{transport}: 不支持的地址 {addr}"),
    )
    .with_category(ErrorCategory::NonRetryable)
}

/// 构造“已关闭”错误。
pub fn closed(what: impl Into<Cow<'static, str>>) -> CoreError {
    CoreError::new(codes::TRANSPORT_CLOSED, what).with_category(ErrorCategory::NonRetryable)
}

/// 将 `io::Error` 包装为 [`CoreError`]，并按错误种类推断分类。
///
/// - `WouldBlock`/`Interrupted`：可重试，建议 50ms 后再试；
/// - `TimedOut`：超时；
/// - 其余：不可重试。
pub fn io_error(
    code: &'static str,
    context: impl Into<Cow<'static, str>>,
    err: io::Error,
) -> CoreError {
    let category = categorize_io_error(&err);
    CoreError::new(code, context)
        .with_cause(err)
        .with_category(category)
}

/// 依据 `io::ErrorKind` 推断错误分类。
pub fn categorize_io_error(err: &io::Error) -> ErrorCategory {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
            ErrorCategory::retry_after(Duration::from_millis(50))
        }
        io::ErrorKind::TimedOut => ErrorCategory::Timeout,
        _ => ErrorCategory::NonRetryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_code() {
        for kind in [
            TransportErrorKind::UnsupportedAddress,
            TransportErrorKind::Resolution,
            TransportErrorKind::Dial,
            TransportErrorKind::Listen,
            TransportErrorKind::Closed,
            TransportErrorKind::Upgrade,
            TransportErrorKind::Io,
            TransportErrorKind::Cancelled,
            TransportErrorKind::Timeout,
        ] {
            let err = CoreError::new(kind.code(), "x");
            assert_eq!(TransportErrorKind::of(&err), Some(kind));
        }
        assert_eq!(
            TransportErrorKind::of(&CoreError::new(codes::CONFIG_INVALID, "x")),
            None
        );
    }

    #[test]
    fn io_errors_are_categorized() {
        let err = io_error(
            codes::TRANSPORT_IO,
            "recv",
            io::Error::from(io::ErrorKind::TimedOut),
        );
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert!(err.find_cause::<io::Error>().is_some());

        let err = io_error(
            codes::TRANSPORT_IO,
            "recv",
            io::Error::from(io::ErrorKind::WouldBlock),
        );
        assert!(err.category().is_retryable());
    }

    #[test]
    fn unsupported_address_mentions_transport_and_addr() {
        let addr: Multiaddr = "/ip4/1.2.3.4/tcp/1".parse().expect("addr");
        let err = unsupported_address("DTLS", &addr);
        assert_eq!(
            TransportErrorKind::of(&err),
            Some(TransportErrorKind::UnsupportedAddress)
        );
        assert!(err.message().contains("/ip4/1.2.3.4/tcp/1"));
    }
}
