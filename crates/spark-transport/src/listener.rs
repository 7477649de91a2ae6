use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use spark_core::contract::CallContext;
use spark_core::error::CoreError;

use crate::connection::{AddrConnection, RawConnection};
use crate::multiaddr::Multiaddr;

/// 原始监听器：接受安全数据报引擎完成握手的入站连接。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - `accept`：阻塞直到有完成握手的连接、监听器被关闭或 `ctx` 被取消/超时；
///   关闭后返回 `spark.transport.closed`；
/// - `close`：幂等，并唤醒所有阻塞中的 `accept`；
/// - `local_addr`：绑定后的实际地址（端口 0 会被替换为系统分配的端口）。
#[async_trait]
pub trait RawListener: Send + Sync + 'static {
    /// 接受下一条入站连接。
    async fn accept(&self, ctx: &CallContext) -> Result<Box<dyn RawConnection>, CoreError>;

    /// 实际绑定地址。
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// 停止接受新连接。
    async fn close(&self) -> Result<(), CoreError>;
}

/// 携带结构化地址的监听器，是升级器的输入。
#[async_trait]
pub trait AddrListener: Send + Sync + 'static {
    /// 接受下一条入站连接，连接已附带结构化地址。
    async fn accept(&self, ctx: &CallContext) -> Result<Box<dyn AddrConnection>, CoreError>;

    /// 实际绑定地址。
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// 监听的结构化地址；原生地址不可用时为 `None`。
    fn listen_multiaddr(&self) -> Option<Multiaddr>;

    /// 停止接受新连接。
    async fn close(&self) -> Result<(), CoreError>;
}
