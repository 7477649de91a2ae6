use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// `CoreError` 是传输栈跨层共享的稳定错误域，是所有可观察错误的最终形态。
///
/// # 设计背景（Why）
/// - 传输实现、升级器与注册表在不同层次产生的故障需要合流为统一的错误码，
///   以便调用方按码值决定“换一个传输重试”还是“直接放弃”。
///
/// # 逻辑解析（How）
/// - 以 Builder 风格方法叠加分类与底层原因，并通过 `source()` 暴露完整链路。
/// - 错误码 `code` 始终为 `'static` 字符串，承载稳定语义；`message` 面向排障人员。
///
/// # 契约说明（What）
/// - **前置条件**：调用方使用 [`codes`] 模块或遵循 `<域>.<语义>` 约定的码值。
/// - **后置条件**：除非显式调用 `with_*` 方法，错误不包含分类与底层原因；
///   未设置分类时 [`category`](Self::category) 回退为 `NonRetryable`。
///
/// # 设计取舍与风险（Trade-offs）
/// - 采用 `Cow` 保存消息，静态文案零分配，动态文案（携带地址等上下文）一次分配。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
    category: Option<ErrorCategory>,
}

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以方便跨线程传递。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

impl CoreError {
    /// 构造核心错误。
    ///
    /// # 示例
    /// ```rust
    /// use spark_core::error::{CoreError, codes};
    ///
    /// let err = CoreError::new(codes::TRANSPORT_CLOSED, "listener closed");
    /// assert_eq!(err.code(), codes::TRANSPORT_CLOSED);
    /// assert!(err.cause().is_none());
    /// ```
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            category: None,
        }
    }

    /// 附带底层原因并返回新的核心错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 为错误标记结构化分类信息，驱动自动化容错策略。
    ///
    /// # 契约说明（What）
    /// - 应与错误码语义保持一致，避免将不可重试错误标记为 `Retryable`；
    /// - 返回新的 `CoreError`，内部分类信息被覆盖。
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// 获取结构化错误分类；未显式设置时返回 [`ErrorCategory::NonRetryable`]。
    pub fn category(&self) -> ErrorCategory {
        self.category
            .clone()
            .unwrap_or(ErrorCategory::NonRetryable)
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// 沿 `source()` 链查找首个指定类型的底层错误。
    pub fn find_cause<E>(&self) -> Option<&E>
    where
        E: Error + 'static,
    {
        let mut current: Option<&(dyn Error + 'static)> = self.source();
        while let Some(err) = current {
            if let Some(found) = err.downcast_ref::<E>() {
                return Some(found);
            }
            current = err.source();
        }
        None
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

/// 错误的主要处置策略。
///
/// # 语义（What）
/// - `Retryable`：瞬时故障，附带退避建议；
/// - `NonRetryable`：重试无意义（地址不匹配、配置错误等）；
/// - `Security`：握手或鉴权违规，应触发安全告警而非重试；
/// - `ProtocolViolation`：对端违背协议约定；
/// - `Cancelled`/`Timeout`：由调用上下文驱动的中止。
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    Retryable(RetryAdvice),
    NonRetryable,
    Security(SecurityClass),
    ProtocolViolation,
    Cancelled,
    Timeout,
}

impl ErrorCategory {
    /// 便捷构造：附带等待时长的可重试分类。
    pub fn retry_after(wait: Duration) -> Self {
        ErrorCategory::Retryable(RetryAdvice::after(wait))
    }

    /// 是否建议调用方重试。
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Retryable(_))
    }
}

/// 重试建议。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryAdvice {
    /// 推荐的等待时长。
    pub wait: Duration,
}

impl RetryAdvice {
    /// 构造一个仅包含等待时间的建议。
    pub const fn after(wait: Duration) -> Self {
        Self { wait }
    }
}

/// 安全类错误的细分。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SecurityClass {
    /// 身份校验失败（证书、对端 ID 不符）。
    Authentication,
    /// 完整性被破坏（报文篡改、解密失败）。
    Integrity,
    /// 无法归类的安全事件。
    Unknown,
}

/// 稳定错误码。
///
/// 错误码遵循 `<领域>.<语义>` 命名约定，调用方可据此决定回退到其他传输或直接中止。
pub mod codes {
    /// 地址形态不被当前传输支持；注册表应尝试下一个传输。
    pub const TRANSPORT_UNSUPPORTED_ADDRESS: &str = "spark.transport.unsupported_address";
    /// 地址无法解析为具体网络端点。
    pub const TRANSPORT_RESOLUTION: &str = "spark.transport.resolution_failed";
    /// 建连失败（握手失败、拒绝连接、超时）。
    pub const TRANSPORT_DIAL: &str = "spark.transport.dial_failed";
    /// 绑定监听失败。
    pub const TRANSPORT_LISTEN: &str = "spark.transport.listen_failed";
    /// 在已关闭的连接或监听器上执行操作。
    pub const TRANSPORT_CLOSED: &str = "spark.transport.closed";
    /// 安全/多路复用协商失败。
    pub const TRANSPORT_UPGRADE: &str = "spark.transport.upgrade_failed";
    /// 传输层 I/O 错误。
    pub const TRANSPORT_IO: &str = "spark.transport.io";
    /// 调用被取消。
    pub const TRANSPORT_CANCELLED: &str = "spark.transport.cancelled";
    /// 调用超时。
    pub const TRANSPORT_TIMEOUT: &str = "spark.transport.timeout";
    /// 配置非法。
    pub const CONFIG_INVALID: &str = "spark.config.invalid";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn category_defaults_to_non_retryable() {
        let err = CoreError::new(codes::TRANSPORT_IO, "boom");
        assert_eq!(err.category(), ErrorCategory::NonRetryable);
        let err = err.with_category(ErrorCategory::retry_after(Duration::from_millis(5)));
        assert!(err.category().is_retryable());
    }

    #[test]
    fn cause_chain_is_searchable() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let inner = CoreError::new(codes::TRANSPORT_IO, "udp connect").with_cause(io_err);
        let outer = CoreError::new(codes::TRANSPORT_DIAL, "dtls dial").with_cause(inner);

        let found = outer.find_cause::<io::Error>().expect("io cause");
        assert_eq!(found.kind(), io::ErrorKind::ConnectionRefused);
        assert_eq!(
            outer.find_cause::<CoreError>().map(CoreError::code),
            Some(codes::TRANSPORT_IO)
        );
    }

    #[test]
    fn display_includes_code() {
        let err = CoreError::new(codes::TRANSPORT_CLOSED, "listener closed");
        assert_eq!(err.to_string(), "[spark.transport.closed] listener closed");
    }
}
