use std::fmt;
use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use spark_core::contract::CallContext;
use spark_core::error::{CoreError, codes};

use crate::error::closed;
use crate::multiaddr::Multiaddr;

/// 可双向读写的字节流。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 原始安全连接、升级后的多路复用子流都表现为“有序字节流”；统一接口使升级器与
///   上层协议无需关心承载它的是 DTLS 记录层还是 TCP。
///
/// ## 契约（What）
/// - `read`：至少读取 1 字节后返回；返回 `Ok(0)` 表示对端已关闭写方向；
/// - `write`：返回实际写入字节数，可能小于 `buf.len()`；
/// - `close`：幂等，关闭后的读写返回 `spark.transport.closed`；
/// - 所有 I/O 继承 `ctx` 的取消与截止约束。
///
/// ## 风险（Trade-offs）
/// - 方法接收 `&self`，实现需自行保证并发读写安全（通常以内部锁或分离读写半部实现）。
#[async_trait]
pub trait ByteStream: Send + Sync + 'static {
    /// 读取数据到 `buf`。
    async fn read(&self, ctx: &CallContext, buf: &mut [u8]) -> Result<usize, CoreError>;

    /// 写入 `buf` 中的数据。
    async fn write(&self, ctx: &CallContext, buf: &[u8]) -> Result<usize, CoreError>;

    /// 关闭流。
    async fn close(&self) -> Result<(), CoreError>;

    /// 循环写入直到 `buf` 全部发送。
    async fn write_all(&self, ctx: &CallContext, buf: &[u8]) -> Result<(), CoreError> {
        let mut remaining = buf;
        while !remaining.is_empty() {
            let written = self.write(ctx, remaining).await?;
            if written == 0 {
                return Err(CoreError::new(codes::TRANSPORT_IO, "写入返回 0 字节"));
            }
            remaining = &remaining[written..];
        }
        Ok(())
    }

    /// 循环读取直到填满 `buf`；中途遇到 EOF 视为连接关闭。
    async fn read_exact(&self, ctx: &CallContext, buf: &mut [u8]) -> Result<(), CoreError> {
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.read(ctx, &mut buf[filled..]).await?;
            if read == 0 {
                return Err(closed("读取过程中对端关闭了连接"));
            }
            filled += read;
        }
        Ok(())
    }
}

/// 原始网络连接：字节流 + 原生套接字地址。
///
/// 安全数据报引擎产出的连接只知道 `SocketAddr`；结构化地址由传输实现负责补齐。
pub trait RawConnection: ByteStream {
    /// 本地绑定地址。
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// 对端地址。
    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

/// 携带结构化地址的连接，是升级器的输入。
///
/// # 契约（What）
/// - `local_multiaddr`/`remote_multiaddr` 在原生地址不可用时返回 `None`，
///   而不是返回错误；升级器据此决定是否记录地址信息。
pub trait AddrConnection: RawConnection {
    /// 本地结构化地址。
    fn local_multiaddr(&self) -> Option<Multiaddr>;

    /// 对端结构化地址。
    fn remote_multiaddr(&self) -> Option<Multiaddr>;
}

/// 数据报网络族，对应 IPv4/IPv6 两类 UDP 端点。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Network {
    Udp4,
    Udp6,
}

impl Network {
    /// 根据套接字地址推断网络族。
    pub fn of(addr: &SocketAddr) -> Self {
        if addr.is_ipv4() {
            Network::Udp4
        } else {
            Network::Udp6
        }
    }

    /// 与 Go/BSD 风格一致的网络名（`udp4`/`udp6`）。
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Udp4 => "udp4",
            Network::Udp6 => "udp6",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
