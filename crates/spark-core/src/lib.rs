#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "spark-core: 传输栈共享的最小核心契约。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：DTLS/TCP/QUIC 等传输实现、连接升级器与传输注册表需要共享同一套取消/截止语义与错误域，否则调用方无法统一决策“回退到其他传输”或“放弃”。"]
#![doc = "- **What**：提供 [`CallContext`]（取消 + 截止）、[`MonotonicTimePoint`] 单调时间基准，以及携带稳定错误码与分类的 [`CoreError`]。"]
#![doc = "- **How**：仅依赖标准库；所有类型 `Send + Sync`，可在 Tokio 多线程运行时中自由传递。"]

pub use async_trait::async_trait;

pub mod contract;
pub mod error;
pub mod prelude;
pub mod time;

pub use contract::{CallContext, CallContextBuilder, Cancellation, Deadline};
pub use error::{CoreError, ErrorCategory, ErrorCause, RetryAdvice, SecurityClass, codes};
pub use time::{MonotonicTimePoint, monotonic_now};

/// 框架统一的返回值别名，默认错误类型为 [`CoreError`]。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;
