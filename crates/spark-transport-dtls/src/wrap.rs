use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use spark_core::contract::CallContext;
use spark_core::error::CoreError;
use spark_transport::{
    AddrConnection, AddrListener, ByteStream, Multiaddr, RawConnection, RawListener,
};
use tracing::trace;

use crate::matcher::dtls_marker;

/// 原生套接字地址 → `/ipX/<ip>/udp/<port>/dtls`；地址不可用时返回 `None`。
pub(crate) fn to_dtls_multiaddr(addr: io::Result<SocketAddr>) -> Option<Multiaddr> {
    match addr {
        Ok(addr) => Some(Multiaddr::from_udp_socket_addr(addr).encapsulate(dtls_marker())),
        Err(err) => {
            trace!(
                target: "spark::transport::dtls",
                error = %err,
                "native address unavailable, no structured address reported"
            );
            None
        }
    }
}

/// 引擎原始连接的包装：读写与原生地址原样委托，额外回报 `/dtls` 结构化地址。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 引擎只认识 `SocketAddr`，而升级器与宿主栈以结构化地址记录连接；包装层负责补齐，
///   并保证回报的地址能被 [`DtlsTransport`](crate::DtlsTransport) 再次拨号。
///
/// ## 契约（What）
/// - `read`/`write`/`close`/`local_addr`/`peer_addr`：与内部连接完全一致；
/// - `local_multiaddr`/`remote_multiaddr`：每次调用时由原生地址现算。
pub struct DtlsConn {
    inner: Box<dyn RawConnection>,
}

impl DtlsConn {
    pub fn new(inner: Box<dyn RawConnection>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ByteStream for DtlsConn {
    async fn read(&self, ctx: &CallContext, buf: &mut [u8]) -> Result<usize, CoreError> {
        self.inner.read(ctx, buf).await
    }

    async fn write(&self, ctx: &CallContext, buf: &[u8]) -> Result<usize, CoreError> {
        self.inner.write(ctx, buf).await
    }

    async fn close(&self) -> Result<(), CoreError> {
        self.inner.close().await
    }
}

impl RawConnection for DtlsConn {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }
}

impl AddrConnection for DtlsConn {
    fn local_multiaddr(&self) -> Option<Multiaddr> {
        to_dtls_multiaddr(self.inner.local_addr())
    }

    fn remote_multiaddr(&self) -> Option<Multiaddr> {
        to_dtls_multiaddr(self.inner.peer_addr())
    }
}

/// 引擎原始监听器的包装：`accept` 产出 [`DtlsConn`]，错误原样透传。
pub struct DtlsListener {
    inner: Box<dyn RawListener>,
}

impl DtlsListener {
    pub fn new(inner: Box<dyn RawListener>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AddrListener for DtlsListener {
    async fn accept(&self, ctx: &CallContext) -> Result<Box<dyn AddrConnection>, CoreError> {
        let raw = self.inner.accept(ctx).await?;
        Ok(Box::new(DtlsConn::new(raw)))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn listen_multiaddr(&self) -> Option<Multiaddr> {
        to_dtls_multiaddr(self.inner.local_addr())
    }

    async fn close(&self) -> Result<(), CoreError> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spark_core::error::codes;
    use spark_transport::error::closed;
    use std::sync::Mutex;

    struct Fixed {
        local: Option<SocketAddr>,
        peer: SocketAddr,
    }

    #[async_trait]
    impl ByteStream for Fixed {
        async fn read(&self, _ctx: &CallContext, buf: &mut [u8]) -> Result<usize, CoreError> {
            buf[0] = 7;
            Ok(1)
        }

        async fn write(&self, _ctx: &CallContext, buf: &[u8]) -> Result<usize, CoreError> {
            Ok(buf.len())
        }

        async fn close(&self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    impl RawConnection for Fixed {
        fn local_addr(&self) -> io::Result<SocketAddr> {
            self.local
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "unbound"))
        }

        fn peer_addr(&self) -> io::Result<SocketAddr> {
            Ok(self.peer)
        }
    }

    fn fixed(local: Option<&str>) -> Fixed {
        Fixed {
            local: local.map(|text| text.parse().expect("local")),
            peer: "[::1]:4433".parse().expect("peer"),
        }
    }

    #[tokio::test]
    async fn io_is_forwarded_unchanged() {
        let conn = DtlsConn::new(Box::new(fixed(Some("127.0.0.1:9000"))));
        let ctx = CallContext::default();
        let mut buf = [0u8; 4];
        assert_eq!(conn.read(&ctx, &mut buf).await.expect("read"), 1);
        assert_eq!(buf[0], 7);
        assert_eq!(conn.write(&ctx, b"abc").await.expect("write"), 3);
        conn.close().await.expect("close");
        assert_eq!(
            conn.peer_addr().expect("peer"),
            "[::1]:4433".parse::<SocketAddr>().expect("socket")
        );
    }

    #[test]
    fn addresses_gain_dtls_suffix() {
        let conn = DtlsConn::new(Box::new(fixed(Some("127.0.0.1:9000"))));
        assert_eq!(
            conn.local_multiaddr().map(|a| a.to_string()),
            Some("/ip4/127.0.0.1/udp/9000/dtls".to_string())
        );
        assert_eq!(
            conn.remote_multiaddr().map(|a| a.to_string()),
            Some("/ip6/::1/udp/4433/dtls".to_string())
        );
    }

    #[test]
    fn unavailable_native_address_yields_none() {
        let conn = DtlsConn::new(Box::new(fixed(None)));
        assert!(conn.local_multiaddr().is_none());
        assert!(conn.remote_multiaddr().is_some());
    }

    struct OneShot {
        pending: Mutex<Option<Fixed>>,
    }

    #[async_trait]
    impl RawListener for OneShot {
        async fn accept(&self, _ctx: &CallContext) -> Result<Box<dyn RawConnection>, CoreError> {
            match self.pending.lock().expect("lock").take() {
                Some(conn) => Ok(Box::new(conn)),
                None => Err(closed("listener closed")),
            }
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok("0.0.0.0:5000".parse().expect("socket"))
        }

        async fn close(&self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn listener_wraps_accepted_connections_and_passes_errors() {
        let listener = DtlsListener::new(Box::new(OneShot {
            pending: Mutex::new(Some(fixed(Some("0.0.0.0:5000")))),
        }));
        assert_eq!(
            listener.listen_multiaddr().map(|a| a.to_string()),
            Some("/ip4/0.0.0.0/udp/5000/dtls".to_string())
        );

        let ctx = CallContext::default();
        let conn = listener.accept(&ctx).await.expect("accept");
        assert_eq!(
            conn.remote_multiaddr().map(|a| a.to_string()),
            Some("/ip6/::1/udp/4433/dtls".to_string())
        );

        let err = listener.accept(&ctx).await.err().expect("closed");
        assert_eq!(err.code(), codes::TRANSPORT_CLOSED);
    }
}
