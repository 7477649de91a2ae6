//! 单调时间基准。
//!
//! # 教案级说明
//!
//! ## 意图（Why）
//! - [`Deadline`](crate::contract::Deadline) 需要与壁钟解耦的绝对时间点；若直接使用
//!   `std::time::Instant`，将无法在日志或跨模块传递中稳定表达“距进程启动多久”。
//! - 传输实现（DTLS、TCP）需要在同一计时源上比较截止时间，本模块提供唯一的基准。
//!
//! ## 契约（What）
//! - [`MonotonicTimePoint`] 表示相对进程内单调基准的偏移量；
//! - [`monotonic_now`] 返回当前时间点，保证单调不减；
//! - [`MonotonicTimePoint::to_instant`] 将时间点还原为标准库 `Instant`，供 Tokio 定时器使用。
//!
//! ## 风险（Trade-offs）
//! - 基准在首次调用时惰性初始化；若调用方在初始化前构造时间点，只会得到零偏移，
//!   不影响比较语义。

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// 相对于进程单调基准的时间点。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonotonicTimePoint {
    offset: Duration,
}

impl MonotonicTimePoint {
    /// 以给定偏移构造时间点。
    pub const fn from_offset(offset: Duration) -> Self {
        Self { offset }
    }

    /// 返回距基准的偏移量。
    pub const fn as_duration(&self) -> Duration {
        self.offset
    }

    /// 饱和加法，避免溢出导致 panic。
    pub fn saturating_add(&self, delta: Duration) -> Self {
        Self {
            offset: self.offset.saturating_add(delta),
        }
    }

    /// 计算自 `earlier` 起经过的时长，若 `earlier` 更晚则返回零。
    pub fn saturating_duration_since(&self, earlier: MonotonicTimePoint) -> Duration {
        self.offset.saturating_sub(earlier.offset)
    }

    /// 还原为标准库 `Instant`。
    pub fn to_instant(&self) -> Instant {
        monotonic_base() + self.offset
    }
}

/// 获取当前单调时间点。
pub fn monotonic_now() -> MonotonicTimePoint {
    MonotonicTimePoint::from_offset(Instant::now().duration_since(monotonic_base()))
}

fn monotonic_base() -> Instant {
    static BASE: OnceLock<Instant> = OnceLock::new();
    *BASE.get_or_init(Instant::now)
}
