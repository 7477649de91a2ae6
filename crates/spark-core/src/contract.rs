use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::time::{MonotonicTimePoint, monotonic_now};

/// 取消原语，统一表达跨模块的可中断性契约。
///
/// # 设计背景（Why）
/// - 拨号、握手、接受连接都可能长时间阻塞，调用方必须能够主动打断，避免无意义的资源占用。
/// - 通过轻量原子位表达取消状态，不依赖具体运行时。
///
/// # 逻辑解析（How）
/// - 内部使用 [`AtomicBool`] 表达取消状态，并通过 [`Arc`] 支持多方共享。
/// - `cancel` 在首次成功设置取消位时返回 `true`，后续重复调用返回 `false`。
/// - `child` 生成共享同一原子位的派生实例。
///
/// # 契约说明（What）
/// - **前置条件**：构造时默认处于“未取消”状态。
/// - **后置条件**：一旦 `cancel` 成功，`is_cancelled` 全局可见。
///
/// # 设计取舍与风险（Trade-offs）
/// - 未提供回调注册接口；传输实现以轮询方式感知取消，存在毫秒级延迟。
#[derive(Clone, Debug)]
pub struct Cancellation {
    inner: Arc<CancellationState>,
}

#[derive(Debug, Default)]
struct CancellationState {
    flag: AtomicBool,
}

impl Cancellation {
    /// 创建处于“未取消”状态的取消令牌。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationState::default()),
        }
    }

    /// 查询当前是否已被标记取消。
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// 将当前令牌标记为取消。
    ///
    /// 返回值为 `true` 表示本次调用首次触发取消；返回 `false` 表示之前已被取消。
    pub fn cancel(&self) -> bool {
        self.inner
            .flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 派生共享同一原子位的子令牌。
    pub fn child(&self) -> Self {
        self.clone()
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// 截止原语，描述操作的最迟完成时间。
///
/// # 契约说明（What）
/// - `Deadline` 可以为空，此时代表调用方未施加硬超时限制。
/// - `after` 以当前单调时间加持续时间生成截止点。
/// - 截止时间不会自动驱动取消，由传输实现在等待 IO 时自行比对。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Deadline {
    instant: Option<MonotonicTimePoint>,
}

impl Deadline {
    /// 创建未设置截止时间的实例。
    pub const fn none() -> Self {
        Self { instant: None }
    }

    /// 根据绝对时间点构造截止时间。
    pub fn at(instant: MonotonicTimePoint) -> Self {
        Self {
            instant: Some(instant),
        }
    }

    /// 基于给定时间点加持续时间生成截止时间。
    pub fn with_timeout(now: MonotonicTimePoint, timeout: Duration) -> Self {
        Self::at(now.saturating_add(timeout))
    }

    /// 以当前时间为起点生成截止时间。
    pub fn after(timeout: Duration) -> Self {
        Self::with_timeout(monotonic_now(), timeout)
    }

    /// 返回内部时间点。
    pub fn instant(&self) -> Option<MonotonicTimePoint> {
        self.instant
    }

    /// 判断在 `now` 时刻是否已经超时。
    pub fn is_expired(&self, now: MonotonicTimePoint) -> bool {
        match self.instant {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// 距离截止时间的剩余时长；未设置截止时返回 `None`。
    pub fn remaining(&self) -> Option<Duration> {
        self.instant
            .map(|instant| instant.saturating_duration_since(monotonic_now()))
    }
}

#[derive(Debug)]
struct CallContextInner {
    cancellation: Cancellation,
    deadline: Deadline,
}

/// 调用上下文，在传输 API 之间传递取消与截止信息。
///
/// # 设计背景（Why）
/// - 拨号、升级握手与读写都需要继承调用方的取消与超时约束；统一载体避免在每个签名中
///   分别传递令牌与时间点。
///
/// # 契约说明（What）
/// - 通过 [`CallContext::builder`] 构造；克隆为常数成本（内部 [`Arc`]）。
/// - `cancellation`/`deadline` 为只读视图。
///
/// # 风险提示（Trade-offs）
/// - 未内置自动取消逻辑，截止时间到期后由消费方返回超时错误。
#[derive(Clone, Debug)]
pub struct CallContext {
    inner: Arc<CallContextInner>,
}

impl CallContext {
    /// 创建上下文构建器。
    pub fn builder() -> CallContextBuilder {
        CallContextBuilder::default()
    }

    /// 获取取消原语。
    pub fn cancellation(&self) -> &Cancellation {
        &self.inner.cancellation
    }

    /// 查询截止时间。
    pub fn deadline(&self) -> Deadline {
        self.inner.deadline
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deadline = match self.deadline().instant() {
            Some(instant) => format!("{:?}", instant.as_duration()),
            None => "none".to_string(),
        };
        write!(
            f,
            "CallContext{{cancelled={}, deadline={}}}",
            self.cancellation().is_cancelled(),
            deadline,
        )
    }
}

/// `CallContext` 构建器。
#[derive(Default)]
pub struct CallContextBuilder {
    cancellation: Cancellation,
    deadline: Deadline,
}

impl CallContextBuilder {
    /// 设置取消原语。
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// 设置截止时间。
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// 以相对超时设置截止时间。
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Deadline::after(timeout))
    }

    /// 构建上下文。
    pub fn build(self) -> CallContext {
        CallContext {
            inner: Arc::new(CallContextInner {
                cancellation: self.cancellation,
                deadline: self.deadline,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_with_children() {
        let token = Cancellation::new();
        let child = token.child();
        assert!(child.cancel());
        assert!(token.is_cancelled());
        assert!(!token.cancel(), "重复取消应返回 false");
    }

    #[test]
    fn deadline_expiry_follows_monotonic_clock() {
        let now = monotonic_now();
        let deadline = Deadline::with_timeout(now, Duration::from_millis(10));
        assert!(!deadline.is_expired(now));
        assert!(deadline.is_expired(now.saturating_add(Duration::from_millis(10))));
        assert!(!Deadline::none().is_expired(now));
    }

    #[test]
    fn remaining_budget_shrinks_to_zero() {
        let budget = Deadline::after(Duration::from_secs(60))
            .remaining()
            .expect("deadline set");
        assert!(budget <= Duration::from_secs(60));
        assert!(budget > Duration::from_secs(50));

        let past = Deadline::with_timeout(monotonic_now(), Duration::ZERO);
        assert_eq!(past.remaining(), Some(Duration::ZERO));
        assert_eq!(Deadline::none().remaining(), None);
    }

    #[test]
    fn builder_carries_cancellation_and_deadline() {
        let token = Cancellation::new();
        let ctx = CallContext::builder()
            .with_cancellation(token.child())
            .with_timeout(Duration::from_secs(5))
            .build();
        assert!(ctx.deadline().instant().is_some());
        token.cancel();
        assert!(ctx.cancellation().is_cancelled());
        assert!(ctx.to_string().contains("cancelled=true"));
    }
}
