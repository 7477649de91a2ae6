use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use spark_core::contract::CallContext;
use spark_core::error::{CoreError, ErrorCategory, codes};
use spark_transport::error::{closed, io_error};
use spark_transport::{ByteStream, Network, RawConnection, RawListener};
use tokio::net::UdpSocket;
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, trace};

use crate::engine::{DtlsConfig, SecureDatagramEngine};
use crate::error::OperationKind;
use crate::util::run_with_context;

const HELLO: u8 = 1;
const ACK: u8 = 2;
const DATA: u8 = 3;
const CLOSE: u8 = 4;

const FINGERPRINT_LEN: usize = 32;
const MAX_PAYLOAD: usize = 1200;
const RECV_BUFFER: usize = 2048;
const HELLO_RETRANSMIT: Duration = Duration::from_millis(200);
const HELLO_ATTEMPTS: usize = 25;

const HANDSHAKE: OperationKind = OperationKind {
    code: codes::TRANSPORT_DIAL,
    message: "plaintext handshake",
};

const READ: OperationKind = OperationKind {
    code: codes::TRANSPORT_IO,
    message: "plaintext read",
};

const WRITE: OperationKind = OperationKind {
    code: codes::TRANSPORT_IO,
    message: "plaintext write",
};

const ACCEPT: OperationKind = OperationKind {
    code: codes::TRANSPORT_LISTEN,
    message: "plaintext accept",
};

/// 监听端的会话表：按源地址索引各会话的投递通道。
///
/// 每个会话带有唯一编号，迟到的移除不会误删同一地址上的新会话；表被清空时
/// 通过 `drained` 唤醒分发任务。
#[derive(Default)]
struct SessionTable {
    peers: Mutex<HashMap<SocketAddr, (u64, mpsc::UnboundedSender<Bytes>)>>,
    next_id: AtomicU64,
    drained: Notify,
}

impl SessionTable {
    fn insert(&self, peer: SocketAddr, tx: mpsc::UnboundedSender<Bytes>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.peers.lock().insert(peer, (id, tx));
        id
    }

    fn contains(&self, peer: &SocketAddr) -> bool {
        self.peers.lock().contains_key(peer)
    }

    fn sender(&self, peer: &SocketAddr) -> Option<mpsc::UnboundedSender<Bytes>> {
        self.peers.lock().get(peer).map(|(_, tx)| tx.clone())
    }

    /// 移除 `peer` 上的会话；`id` 为 `Some` 时仅在编号一致时移除。
    fn remove(&self, peer: &SocketAddr, id: Option<u64>) {
        let mut peers = self.peers.lock();
        if id.is_none_or(|id| peers.get(peer).is_some_and(|(current, _)| *current == id)) {
            peers.remove(peer);
        }
        if peers.is_empty() {
            self.drained.notify_one();
        }
    }

    fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }
}

/// 不加密的安全数据报引擎，仅用于测试。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 端到端测试需要一个真实走 UDP 的引擎来验证“解析 → 握手 → 包装 → 升级”整条链路，
///   但又不应把真正的 DTLS 实现引入本 crate。
///
/// ## 逻辑（How）
/// - 报文首字节为类型：`HELLO`/`ACK` 携带证书 SHA-256 指纹，`DATA` 携带载荷，`CLOSE` 无载荷；
/// - 拨号端每 200ms 重发一次 `HELLO`，直到收到 `ACK`；
/// - 监听端由一个分发任务按源地址把报文投递到各会话的通道，首个 `HELLO` 创建会话，
///   重复的 `HELLO` 只会触发重发 `ACK`；
/// - 关闭监听器只停止接纳新会话，已接受的会话照常收发，分发任务在最后一个会话结束后退出；
/// - 单次写入最多 1200 字节，超出部分由调用方再次写入。
///
/// ## 风险（Trade-offs）
/// - 无重传、无排序保证，只适合回环地址上的测试；
/// - 指纹仅记录在日志中，不做任何信任校验。
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaintextDatagramEngine;

impl PlaintextDatagramEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecureDatagramEngine for PlaintextDatagramEngine {
    async fn dial(
        &self,
        ctx: &CallContext,
        network: Network,
        remote: SocketAddr,
        config: &DtlsConfig,
    ) -> Result<Box<dyn RawConnection>, CoreError> {
        let bind_addr = client_bind_addr(network, &remote);
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|err| io_error(codes::TRANSPORT_IO, format!("bind {bind_addr}"), err))?;
        socket
            .connect(remote)
            .await
            .map_err(|err| io_error(codes::TRANSPORT_IO, format!("connect {remote}"), err))?;

        let hello = frame(HELLO, &fingerprint(config));
        run_with_context(ctx, HANDSHAKE, async {
            let mut buf = vec![0u8; RECV_BUFFER];
            for attempt in 0..HELLO_ATTEMPTS {
                socket
                    .send(&hello)
                    .await
                    .map_err(|err| io_error(codes::TRANSPORT_IO, "send hello", err))?;
                match tokio::time::timeout(HELLO_RETRANSMIT, socket.recv(&mut buf)).await {
                    Ok(Ok(len)) if len == 1 + FINGERPRINT_LEN && buf[0] == ACK => {
                        debug!(
                            target: "spark::transport::dtls::testing",
                            %remote,
                            peer_fingerprint = %hex::encode(&buf[1..len]),
                            "plaintext handshake completed"
                        );
                        return Ok(());
                    }
                    Ok(Ok(_)) => continue,
                    Ok(Err(err)) => {
                        return Err(io_error(codes::TRANSPORT_IO, "recv ack", err));
                    }
                    Err(_) => {
                        trace!(
                            target: "spark::transport::dtls::testing",
                            attempt,
                            %remote,
                            "hello retransmit"
                        );
                    }
                }
            }
            Err(CoreError::new(
                codes::TRANSPORT_TIMEOUT,
                format!("plaintext handshake with {remote} got no answer"),
            )
            .with_category(ErrorCategory::Timeout))
        })
        .await?;

        Ok(Box::new(Session::new(Arc::new(socket), remote, Inbound::Socket)))
    }

    async fn listen(
        &self,
        _network: Network,
        local: SocketAddr,
        config: &DtlsConfig,
    ) -> Result<Box<dyn RawListener>, CoreError> {
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|err| io_error(codes::TRANSPORT_IO, format!("bind {local}"), err))?;
        let socket = Arc::new(socket);

        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        tokio::spawn(demultiplex(
            socket.clone(),
            fingerprint(config),
            incoming_tx,
            closed_rx,
        ));

        Ok(Box::new(PlaintextListener {
            socket,
            incoming: tokio::sync::Mutex::new(incoming_rx),
            closed_tx,
        }))
    }
}

fn fingerprint(config: &DtlsConfig) -> [u8; FINGERPRINT_LEN] {
    let digest = Sha256::digest(config.certificate().as_ref());
    let mut out = [0u8; FINGERPRINT_LEN];
    out.copy_from_slice(&digest);
    out
}

fn frame(kind: u8, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(kind);
    buf.put_slice(payload);
    buf.freeze()
}

/// 回环目标绑定回环地址，其余绑定通配地址；端口交给系统分配。
fn client_bind_addr(network: Network, remote: &SocketAddr) -> SocketAddr {
    let ip: IpAddr = match (network, remote.ip().is_loopback()) {
        (Network::Udp4, true) => Ipv4Addr::LOCALHOST.into(),
        (Network::Udp4, false) => Ipv4Addr::UNSPECIFIED.into(),
        (Network::Udp6, true) => Ipv6Addr::LOCALHOST.into(),
        (Network::Udp6, false) => Ipv6Addr::UNSPECIFIED.into(),
    };
    SocketAddr::new(ip, 0)
}

async fn demultiplex(
    socket: Arc<UdpSocket>,
    fingerprint: [u8; FINGERPRINT_LEN],
    incoming: mpsc::UnboundedSender<Session>,
    mut shutdown: watch::Receiver<bool>,
) {
    let sessions: Arc<SessionTable> = Arc::default();
    let ack = frame(ACK, &fingerprint);
    let mut buf = vec![0u8; RECV_BUFFER];
    let mut accepting = true;

    loop {
        if !accepting && sessions.is_empty() {
            break;
        }
        let (len, from) = tokio::select! {
            _ = shutdown.wait_for(|closed| *closed), if accepting => {
                accepting = false;
                continue;
            }
            _ = sessions.drained.notified(), if !accepting => continue,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(err) => {
                    trace!(
                        target: "spark::transport::dtls::testing",
                        error = %err,
                        "recv_from failed"
                    );
                    continue;
                }
            },
        };
        let datagram = &buf[..len];

        match datagram.first().copied() {
            Some(HELLO) if len == 1 + FINGERPRINT_LEN => {
                if !sessions.contains(&from) {
                    if !accepting {
                        trace!(
                            target: "spark::transport::dtls::testing",
                            peer = %from,
                            "hello after listener close dropped"
                        );
                        continue;
                    }
                    let (tx, rx) = mpsc::unbounded_channel();
                    let id = sessions.insert(from, tx);
                    debug!(
                        target: "spark::transport::dtls::testing",
                        peer = %from,
                        peer_fingerprint = %hex::encode(&datagram[1..]),
                        "plaintext handshake accepted"
                    );
                    let session = Session::new(
                        socket.clone(),
                        from,
                        Inbound::Channel {
                            rx: tokio::sync::Mutex::new(rx),
                            sessions: sessions.clone(),
                            id,
                        },
                    );
                    // 监听器已被丢弃：会话随发送失败一并丢弃，不再接纳新会话。
                    if incoming.send(session).is_err() {
                        accepting = false;
                        continue;
                    }
                }
                if let Err(err) = socket.send_to(&ack, from).await {
                    trace!(
                        target: "spark::transport::dtls::testing",
                        peer = %from,
                        error = %err,
                        "ack send failed"
                    );
                }
            }
            Some(kind @ (DATA | CLOSE)) => {
                if let Some(sender) = sessions.sender(&from) {
                    let _ = sender.send(Bytes::copy_from_slice(datagram));
                }
                if kind == CLOSE {
                    sessions.remove(&from, None);
                }
            }
            _ => {
                trace!(
                    target: "spark::transport::dtls::testing",
                    peer = %from,
                    len,
                    "stray datagram dropped"
                );
            }
        }
    }

    debug!(
        target: "spark::transport::dtls::testing",
        local = ?socket.local_addr().ok(),
        "plaintext demultiplexer stopped"
    );
}

enum Inbound {
    /// 拨号端：已 `connect` 的套接字只接收来自对端的报文。
    Socket,
    /// 监听端：由分发任务投递。
    Channel {
        rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
        sessions: Arc<SessionTable>,
        id: u64,
    },
}

/// 单个明文会话，拨号端与监听端共用。
struct Session {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    inbound: Inbound,
    pending: Mutex<BytesMut>,
    remote_closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl Session {
    fn new(socket: Arc<UdpSocket>, peer: SocketAddr, inbound: Inbound) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            socket,
            peer,
            inbound,
            pending: Mutex::new(BytesMut::new()),
            remote_closed: AtomicBool::new(false),
            closed_tx,
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    async fn next_datagram(&self) -> Result<Option<Bytes>, CoreError> {
        match &self.inbound {
            Inbound::Socket => {
                let mut buf = vec![0u8; RECV_BUFFER];
                let len = self
                    .socket
                    .recv(&mut buf)
                    .await
                    .map_err(|err| io_error(codes::TRANSPORT_IO, "plaintext recv", err))?;
                buf.truncate(len);
                Ok(Some(Bytes::from(buf)))
            }
            Inbound::Channel { rx, .. } => Ok(rx.lock().await.recv().await),
        }
    }

    async fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        match &self.inbound {
            Inbound::Socket => self.socket.send(datagram).await,
            Inbound::Channel { .. } => self.socket.send_to(datagram, self.peer).await,
        }
    }

    /// 从监听端会话表中注销自身；拨号端无操作。
    fn deregister(&self) {
        if let Inbound::Channel { sessions, id, .. } = &self.inbound {
            sessions.remove(&self.peer, Some(*id));
        }
    }

    fn drain_pending(&self, buf: &mut [u8]) -> Option<usize> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return None;
        }
        let len = pending.len().min(buf.len());
        buf[..len].copy_from_slice(&pending.split_to(len));
        Some(len)
    }
}

#[async_trait]
impl ByteStream for Session {
    async fn read(&self, ctx: &CallContext, buf: &mut [u8]) -> Result<usize, CoreError> {
        if self.is_closed() {
            return Err(closed("plaintext session closed"));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(len) = self.drain_pending(buf) {
            return Ok(len);
        }
        if self.remote_closed.load(Ordering::Acquire) {
            return Ok(0);
        }

        let mut closed_rx = self.closed_tx.subscribe();
        loop {
            let datagram = tokio::select! {
                _ = closed_rx.wait_for(|closed| *closed) => {
                    return Err(closed("plaintext session closed"));
                }
                next = run_with_context(ctx, READ, self.next_datagram()) => next?,
            };
            let Some(datagram) = datagram else {
                return Ok(0);
            };

            match datagram.first().copied() {
                Some(DATA) => {
                    let payload = &datagram[1..];
                    if payload.is_empty() {
                        continue;
                    }
                    let len = payload.len().min(buf.len());
                    buf[..len].copy_from_slice(&payload[..len]);
                    if len < payload.len() {
                        self.pending.lock().extend_from_slice(&payload[len..]);
                    }
                    return Ok(len);
                }
                Some(CLOSE) => {
                    self.remote_closed.store(true, Ordering::Release);
                    return Ok(0);
                }
                // 握手阶段的重发报文。
                _ => continue,
            }
        }
    }

    async fn write(&self, ctx: &CallContext, buf: &[u8]) -> Result<usize, CoreError> {
        if self.is_closed() {
            return Err(closed("plaintext session closed"));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(MAX_PAYLOAD);
        let datagram = frame(DATA, &buf[..len]);
        run_with_context(ctx, WRITE, async {
            self.send(&datagram)
                .await
                .map_err(|err| io_error(WRITE.code, WRITE.message, err))
        })
        .await?;
        Ok(len)
    }

    async fn close(&self) -> Result<(), CoreError> {
        if self.closed_tx.send_replace(true) {
            return Ok(());
        }
        if let Err(err) = self.send(&frame(CLOSE, &[])).await {
            trace!(
                target: "spark::transport::dtls::testing",
                peer = %self.peer,
                error = %err,
                "close notify failed"
            );
        }
        self.deregister();
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.deregister();
    }
}

impl RawConnection for Session {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.peer)
    }
}

struct PlaintextListener {
    socket: Arc<UdpSocket>,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Session>>,
    closed_tx: watch::Sender<bool>,
}

#[async_trait]
impl RawListener for PlaintextListener {
    async fn accept(&self, ctx: &CallContext) -> Result<Box<dyn RawConnection>, CoreError> {
        let mut closed_rx = self.closed_tx.subscribe();
        if *closed_rx.borrow() {
            return Err(closed("plaintext listener closed"));
        }

        let next = run_with_context(ctx, ACCEPT, async {
            Ok(self.incoming.lock().await.recv().await)
        });
        tokio::select! {
            biased;
            _ = closed_rx.wait_for(|closed| *closed) => Err(closed("plaintext listener closed")),
            session = next => match session? {
                Some(session) => Ok(Box::new(session) as Box<dyn RawConnection>),
                None => Err(closed("plaintext listener closed")),
            },
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn close(&self) -> Result<(), CoreError> {
        if self.closed_tx.send_replace(true) {
            return Ok(());
        }
        // 丢弃尚未被取走的会话；通道正被 `accept` 占用时，改由监听器被丢弃时一并释放。
        if let Ok(mut incoming) = self.incoming.try_lock() {
            incoming.close();
            while incoming.try_recv().is_ok() {}
        }
        debug!(
            target: "spark::transport::dtls::testing",
            local = ?self.socket.local_addr().ok(),
            "plaintext listener closed"
        );
        Ok(())
    }
}

impl Drop for PlaintextListener {
    fn drop(&mut self) {
        self.closed_tx.send_replace(true);
    }
}
