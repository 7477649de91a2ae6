use std::fmt;

use async_trait::async_trait;
use spark_core::contract::CallContext;
use spark_core::error::CoreError;

use crate::multiaddr::Multiaddr;
use crate::peer::PeerId;
use crate::upgrade::{UpgradedConnection, UpgradedListener};

/// 传输的静态描述：名称、处理的协议与是否为代理传输。
///
/// 升级后的连接持有描述符副本，以便回报承载自身的传输，而不必持有传输实例。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportDescriptor {
    name: &'static str,
    protocols: &'static [&'static str],
    proxy: bool,
}

impl TransportDescriptor {
    pub const fn new(name: &'static str, protocols: &'static [&'static str], proxy: bool) -> Self {
        Self {
            name,
            protocols,
            proxy,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn protocols(&self) -> &'static [&'static str] {
        self.protocols
    }

    pub fn is_proxy(&self) -> bool {
        self.proxy
    }
}

impl fmt::Display for TransportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 可插拔传输契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - P2P 宿主栈通过注册表同时挂载多种传输；每个传输声明自己能处理的地址形态，
///   并产出“已升级”的连接与监听器，宿主栈无需感知底层协议差异。
///
/// ## 契约（What）
/// - `can_handle`：纯函数，不做任何 I/O；
/// - `dial`：对不被 `can_handle` 接受的地址必须在任何网络 I/O 之前失败，
///   错误码为 `spark.transport.unsupported_address`；
/// - `listen`：同上；成功后返回的监听器 `accept` 产出已升级连接；
/// - `protocols`：本传输在注册表中认领的协议名；
/// - `is_proxy`：是否为代理/中继传输；
/// - `name`：人类可读名称，用于日志。
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// 判断地址是否由本传输处理。
    fn can_handle(&self, addr: &Multiaddr) -> bool;

    /// 拨号并升级到期望的对端。
    async fn dial(
        &self,
        ctx: &CallContext,
        addr: &Multiaddr,
        peer: &PeerId,
    ) -> Result<Box<dyn UpgradedConnection>, CoreError>;

    /// 在地址上监听，返回产出已升级连接的监听器。
    async fn listen(&self, addr: &Multiaddr) -> Result<Box<dyn UpgradedListener>, CoreError>;

    /// 认领的协议名。
    fn protocols(&self) -> &'static [&'static str];

    /// 是否为代理传输。
    fn is_proxy(&self) -> bool;

    /// 人类可读名称。
    fn name(&self) -> &'static str;

    /// 汇总为静态描述符。
    fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor::new(self.name(), self.protocols(), self.is_proxy())
    }
}
