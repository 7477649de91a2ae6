use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use spark_core::prelude::{CallContext, CoreError, ErrorCategory, SecurityClass, codes};
use spark_transport::error::closed;
use spark_transport::{
    AddrConnection, AddrListener, ByteStream, Multiaddr, PeerId, TransportDescriptor,
    UpgradedConnection, UpgradedListener, Upgrader,
};
use tracing::{debug, trace};

/// 明文升级器：以长度前缀明文交换对端标识，不做任何加密或鉴权，仅用于测试。
///
/// # 契约（What）
/// - 双方各写入 `u16` 大端长度 + 标识字节，再读取对端的同格式报文；
/// - 出站升级时，对端标识与期望不符即关闭连接并返回 `Security(Authentication)` 分类的
///   `spark.transport.upgrade_failed`；
/// - 升级后的连接只提供一条子流：`open_stream` 与 `accept_stream` 合计只能成功一次。
#[derive(Clone, Debug)]
pub struct InsecureUpgrader {
    local: PeerId,
}

impl InsecureUpgrader {
    pub fn new(local: PeerId) -> Self {
        Self { local }
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }
}

#[async_trait]
impl Upgrader for InsecureUpgrader {
    async fn upgrade_outbound(
        &self,
        ctx: &CallContext,
        transport: TransportDescriptor,
        conn: Box<dyn AddrConnection>,
        expected: &PeerId,
    ) -> Result<Box<dyn UpgradedConnection>, CoreError> {
        let conn: Arc<dyn AddrConnection> = Arc::from(conn);
        let outcome = match exchange_ids(ctx, conn.as_ref(), &self.local).await {
            Ok(remote) if &remote == expected => Ok(remote),
            Ok(remote) => Err(CoreError::new(
                codes::TRANSPORT_UPGRADE,
                format!("期望对端 {expected}，实际为 {remote}"),
            )
            .with_category(ErrorCategory::Security(SecurityClass::Authentication))),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(remote) => Ok(Box::new(InsecureConnection::new(
                self.local.clone(),
                remote,
                transport,
                conn,
            ))),
            Err(err) => {
                close_quietly(conn.as_ref()).await;
                Err(err)
            }
        }
    }

    fn upgrade_listener(
        &self,
        transport: TransportDescriptor,
        listener: Box<dyn AddrListener>,
    ) -> Box<dyn UpgradedListener> {
        Box::new(InsecureListener {
            local: self.local.clone(),
            transport,
            inner: listener,
        })
    }
}

async fn exchange_ids(
    ctx: &CallContext,
    conn: &dyn AddrConnection,
    local: &PeerId,
) -> Result<PeerId, CoreError> {
    let id = local.as_bytes();
    let len = u16::try_from(id.len())
        .map_err(|_| CoreError::new(codes::TRANSPORT_UPGRADE, "本端标识超过 65535 字节"))?;

    let mut hello = Vec::with_capacity(2 + id.len());
    hello.extend_from_slice(&len.to_be_bytes());
    hello.extend_from_slice(id);
    conn.write_all(ctx, &hello)
        .await
        .map_err(|err| upgrade_io("发送本端标识", err))?;

    let mut len_buf = [0u8; 2];
    conn.read_exact(ctx, &mut len_buf)
        .await
        .map_err(|err| upgrade_io("读取对端标识长度", err))?;
    let mut remote = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
    conn.read_exact(ctx, &mut remote)
        .await
        .map_err(|err| upgrade_io("读取对端标识", err))?;

    String::from_utf8(remote).map(PeerId::from).map_err(|err| {
        CoreError::new(codes::TRANSPORT_UPGRADE, "对端标识不是合法 UTF-8")
            .with_category(ErrorCategory::ProtocolViolation)
            .with_cause(err)
    })
}

/// 升级失败路径上关闭连接；关闭错误不覆盖升级错误，只记入日志。
async fn close_quietly(conn: &dyn AddrConnection) {
    if let Err(err) = conn.close().await {
        trace!(
            target: "spark::transport::dtls::testing",
            remote = ?conn.remote_multiaddr(),
            error = %err,
            "close after failed upgrade failed"
        );
    }
}

fn upgrade_io(step: &'static str, cause: CoreError) -> CoreError {
    let category = cause.category();
    CoreError::new(codes::TRANSPORT_UPGRADE, step)
        .with_category(category)
        .with_cause(cause)
}

/// [`InsecureUpgrader`] 产出的监听器。
pub struct InsecureListener {
    local: PeerId,
    transport: TransportDescriptor,
    inner: Box<dyn AddrListener>,
}

#[async_trait]
impl UpgradedListener for InsecureListener {
    async fn accept(&self, ctx: &CallContext) -> Result<Box<dyn UpgradedConnection>, CoreError> {
        let conn: Arc<dyn AddrConnection> = Arc::from(self.inner.accept(ctx).await?);
        match exchange_ids(ctx, conn.as_ref(), &self.local).await {
            Ok(remote) => {
                debug!(
                    target: "spark::transport::dtls::testing",
                    %remote,
                    transport = %self.transport,
                    "inbound connection upgraded"
                );
                Ok(Box::new(InsecureConnection::new(
                    self.local.clone(),
                    remote,
                    self.transport.clone(),
                    conn,
                )))
            }
            Err(err) => {
                close_quietly(conn.as_ref()).await;
                Err(err)
            }
        }
    }

    fn listen_multiaddr(&self) -> Option<Multiaddr> {
        self.inner.listen_multiaddr()
    }

    async fn close(&self) -> Result<(), CoreError> {
        self.inner.close().await
    }
}

/// 仅承载单条子流的“升级后”连接。
pub struct InsecureConnection {
    local: PeerId,
    remote: PeerId,
    transport: TransportDescriptor,
    conn: Arc<dyn AddrConnection>,
    stream_taken: AtomicBool,
    closed: AtomicBool,
}

impl InsecureConnection {
    fn new(
        local: PeerId,
        remote: PeerId,
        transport: TransportDescriptor,
        conn: Arc<dyn AddrConnection>,
    ) -> Self {
        Self {
            local,
            remote,
            transport,
            conn,
            stream_taken: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn take_stream(&self) -> Result<Box<dyn ByteStream>, CoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed("insecure connection closed"));
        }
        if self.stream_taken.swap(true, Ordering::AcqRel) {
            return Err(CoreError::new(
                codes::TRANSPORT_UPGRADE,
                "单流连接的子流已被取走",
            ));
        }
        Ok(Box::new(SingleStream {
            conn: self.conn.clone(),
        }))
    }
}

#[async_trait]
impl UpgradedConnection for InsecureConnection {
    fn local_peer(&self) -> &PeerId {
        &self.local
    }

    fn remote_peer(&self) -> &PeerId {
        &self.remote
    }

    fn local_multiaddr(&self) -> Option<Multiaddr> {
        self.conn.local_multiaddr()
    }

    fn remote_multiaddr(&self) -> Option<Multiaddr> {
        self.conn.remote_multiaddr()
    }

    fn transport(&self) -> &TransportDescriptor {
        &self.transport
    }

    async fn open_stream(&self, _ctx: &CallContext) -> Result<Box<dyn ByteStream>, CoreError> {
        self.take_stream()
    }

    async fn accept_stream(&self, _ctx: &CallContext) -> Result<Box<dyn ByteStream>, CoreError> {
        self.take_stream()
    }

    async fn close(&self) -> Result<(), CoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.conn.close().await
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct SingleStream {
    conn: Arc<dyn AddrConnection>,
}

#[async_trait]
impl ByteStream for SingleStream {
    async fn read(&self, ctx: &CallContext, buf: &mut [u8]) -> Result<usize, CoreError> {
        self.conn.read(ctx, buf).await
    }

    async fn write(&self, ctx: &CallContext, buf: &[u8]) -> Result<usize, CoreError> {
        self.conn.write(ctx, buf).await
    }

    async fn close(&self) -> Result<(), CoreError> {
        self.conn.close().await
    }
}
