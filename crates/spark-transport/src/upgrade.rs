use async_trait::async_trait;
use spark_core::contract::CallContext;
use spark_core::error::CoreError;

use crate::connection::{AddrConnection, ByteStream};
use crate::listener::AddrListener;
use crate::multiaddr::Multiaddr;
use crate::peer::PeerId;
use crate::transport::TransportDescriptor;

/// 连接升级器：在原始连接之上协商安全层与多路复用层。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 传输实现只负责“把字节送到对端”；身份认证、子流复用属于另一层职责，
///   由宿主栈注入的升级器完成，传输实现不得自行实现。
///
/// ## 契约（What）
/// - `upgrade_outbound`：对出站连接执行协商；若认证出的对端与 `expected` 不符必须失败；
///   失败时升级器负责关闭传入的连接；
/// - `upgrade_listener`：包装监听器，使其 `accept` 产出已升级的连接；本身不做 I/O；
/// - `transport` 描述符用于让升级后的连接回报“我由哪个传输承载”。
#[async_trait]
pub trait Upgrader: Send + Sync + 'static {
    /// 升级出站连接。
    async fn upgrade_outbound(
        &self,
        ctx: &CallContext,
        transport: TransportDescriptor,
        conn: Box<dyn AddrConnection>,
        expected: &PeerId,
    ) -> Result<Box<dyn UpgradedConnection>, CoreError>;

    /// 升级监听器。
    fn upgrade_listener(
        &self,
        transport: TransportDescriptor,
        listener: Box<dyn AddrListener>,
    ) -> Box<dyn UpgradedListener>;
}

/// 已完成安全与多路复用协商的连接。
#[async_trait]
pub trait UpgradedConnection: Send + Sync + 'static {
    /// 本端身份。
    fn local_peer(&self) -> &PeerId;

    /// 认证后的对端身份。
    fn remote_peer(&self) -> &PeerId;

    /// 本地结构化地址。
    fn local_multiaddr(&self) -> Option<Multiaddr>;

    /// 对端结构化地址。
    fn remote_multiaddr(&self) -> Option<Multiaddr>;

    /// 承载本连接的传输。
    fn transport(&self) -> &TransportDescriptor;

    /// 主动打开子流。
    async fn open_stream(&self, ctx: &CallContext) -> Result<Box<dyn ByteStream>, CoreError>;

    /// 接受对端打开的子流。
    async fn accept_stream(&self, ctx: &CallContext) -> Result<Box<dyn ByteStream>, CoreError>;

    /// 关闭连接及其全部子流。
    async fn close(&self) -> Result<(), CoreError>;

    /// 是否已关闭。
    fn is_closed(&self) -> bool;
}

/// 产出已升级连接的监听器。
#[async_trait]
pub trait UpgradedListener: Send + Sync + 'static {
    /// 接受并升级下一条入站连接。
    async fn accept(&self, ctx: &CallContext) -> Result<Box<dyn UpgradedConnection>, CoreError>;

    /// 监听的结构化地址。
    fn listen_multiaddr(&self) -> Option<Multiaddr>;

    /// 关闭监听器。
    async fn close(&self) -> Result<(), CoreError>;
}
