use std::fmt;

use spark_core::error::{CoreError, ErrorCategory, codes};

/// DTLS 传输错误映射模块。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 引擎与解析器产生的错误需要合流为传输契约约定的稳定错误码（`dial_failed`、
///   `listen_failed`、`resolution_failed`），宿主栈才能据此决定回退或放弃。
///
/// ## 逻辑（How）
/// - `OperationKind` 描述一类操作的错误码与默认文案；
/// - [`wrap_cause`] 保留底层错误的分类，并把底层错误挂到 `source()` 链上；
/// - 取消由调用上下文驱动，使用独立错误码，且在包装时原样透传；
/// - 超时则不同：引擎报告的超时与握手超时都属于操作本身失败，照常包装，
///   仅 `run_with_context` 因上下文截止产生的超时不经过包装。
///
/// ## 契约（What）
/// - 所有返回的 [`CoreError`] 均携带 `spark.transport.*` 错误码；
/// - 包装后的错误 `category()` 与底层错误一致（超时包装后仍为 `Timeout`）。
#[derive(Clone, Copy, Debug)]
pub(crate) struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub(crate) const RESOLVE: OperationKind = OperationKind {
    code: codes::TRANSPORT_RESOLUTION,
    message: "dtls resolve",
};

pub(crate) const DIAL: OperationKind = OperationKind {
    code: codes::TRANSPORT_DIAL,
    message: "dtls dial",
};

pub(crate) const LISTEN: OperationKind = OperationKind {
    code: codes::TRANSPORT_LISTEN,
    message: "dtls listen",
};

/// 以操作种类包装底层错误，保留其分类。
///
/// 底层错误本身已是取消错误时原样返回。
pub(crate) fn wrap_cause(
    kind: OperationKind,
    target: impl fmt::Display,
    cause: CoreError,
) -> CoreError {
    if cause.code() == codes::TRANSPORT_CANCELLED {
        return cause;
    }
    let category = cause.category();
    CoreError::new(kind.code, format!("{} {target} failed", kind.message))
        .with_category(category)
        .with_cause(cause)
}

/// 构造解析失败错误。
pub(crate) fn resolution_error(target: impl fmt::Display, detail: impl fmt::Display) -> CoreError {
    CoreError::new(
        RESOLVE.code,
        format!("{} {target}: {detail}", RESOLVE.message),
    )
    .with_category(ErrorCategory::NonRetryable)
}

/// 构造取消错误。
pub(crate) fn cancelled_error(kind: OperationKind) -> CoreError {
    CoreError::new(
        codes::TRANSPORT_CANCELLED,
        format!("{} cancelled", kind.message),
    )
    .with_category(ErrorCategory::Cancelled)
}

/// 构造超时错误。
pub(crate) fn timeout_error(kind: OperationKind) -> CoreError {
    CoreError::new(
        codes::TRANSPORT_TIMEOUT,
        format!("{} timed out", kind.message),
    )
    .with_category(ErrorCategory::Timeout)
}
