//! # spark-core Prelude
//!
//! 为传输实现 crate 提供浅路径导入入口：`use spark_core::prelude::*;` 即可获得调用上下文、
//! 错误域与时间基准。仅收录跨 crate 高频依赖的类型。

pub use crate::contract::{CallContext, CallContextBuilder, Cancellation, Deadline};
pub use crate::error::{CoreError, ErrorCategory, RetryAdvice, SecurityClass, codes};
pub use crate::time::{MonotonicTimePoint, monotonic_now};
pub use async_trait::async_trait;
