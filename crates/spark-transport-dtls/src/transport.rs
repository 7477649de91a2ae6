use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use spark_core::prelude::{CallContext, CoreError};
use spark_transport::error::unsupported_address;
use spark_transport::{
    AddrConnection, AddrListener, Multiaddr, PeerId, Transport, UpgradedConnection,
    UpgradedListener, Upgrader,
};
use tracing::{debug, warn};

use crate::config::DtlsTransportConfig;
use crate::engine::{DtlsConfig, SecureDatagramEngine};
use crate::error::{self, DIAL, LISTEN, RESOLVE};
use crate::matcher::{dtls_marker, matches_dtls};
use crate::util::{bounded_by_fallback, resolve_endpoint, run_with_context};
use crate::wrap::{DtlsConn, DtlsListener};

const NAME: &str = "DTLS";
const PROTOCOLS: &[&str] = &["dtls"];

/// DTLS 传输适配器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 让宿主栈以 `/ip4/1.2.3.4/udp/4433/dtls` 这样的结构化地址拨号/监听，而真正的
///   DTLS 握手由注入的 [`SecureDatagramEngine`] 完成、安全与多路复用协商由注入的
///   [`Upgrader`] 完成；本类型只负责把三者按固定顺序串起来。
///
/// ## 逻辑（How）
/// - 拨号：形态校验 → 去掉 `/dtls` → 解析端点 → 引擎握手（受上下文与握手超时约束）
///   → [`DtlsConn`] 包装 → `upgrade_outbound`；
/// - 监听：形态校验 → 去掉 `/dtls` → 解析端点 → 引擎绑定 → [`DtlsListener`] 包装
///   → `upgrade_listener`。
///
/// ## 契约（What）
/// - 不接受的地址在任何网络 I/O 之前以 `spark.transport.unsupported_address` 失败；
/// - 不重试，不缓存连接，不派生后台任务；升级器的结果与错误原样返回；
/// - 凭据与配置在构造后不可变，实例可在任务间共享。
pub struct DtlsTransport {
    upgrader: Arc<dyn Upgrader>,
    engine: Arc<dyn SecureDatagramEngine>,
    credentials: DtlsConfig,
    settings: DtlsTransportConfig,
}

impl DtlsTransport {
    /// 以默认配置构造。
    pub fn new(
        upgrader: Arc<dyn Upgrader>,
        engine: Arc<dyn SecureDatagramEngine>,
        credentials: DtlsConfig,
    ) -> Self {
        Self {
            upgrader,
            engine,
            credentials,
            settings: DtlsTransportConfig::default(),
        }
    }

    /// 替换运行配置；非法配置返回 `spark.config.invalid`。
    pub fn with_settings(mut self, settings: DtlsTransportConfig) -> Result<Self, CoreError> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    /// 当前运行配置。
    pub fn settings(&self) -> &DtlsTransportConfig {
        &self.settings
    }

    /// 本地凭据。
    pub fn credentials(&self) -> &DtlsConfig {
        &self.credentials
    }

    /// 校验地址形态并剥离 `/dtls`，得到 UDP 端点。
    fn udp_endpoint(&self, addr: &Multiaddr) -> Result<Multiaddr, CoreError> {
        if !self.can_handle(addr) {
            debug!(target: "spark::transport::dtls", %addr, "address rejected");
            return Err(unsupported_address(NAME, addr));
        }
        Ok(addr.decapsulate(dtls_marker()))
    }
}

#[async_trait]
impl Transport for DtlsTransport {
    fn can_handle(&self, addr: &Multiaddr) -> bool {
        matches_dtls(addr, self.settings.allow_dns)
    }

    async fn dial(
        &self,
        ctx: &CallContext,
        addr: &Multiaddr,
        peer: &PeerId,
    ) -> Result<Box<dyn UpgradedConnection>, CoreError> {
        let endpoint = self.udp_endpoint(addr)?;
        debug!(
            target: "spark::transport::dtls",
            %addr,
            %peer,
            budget = ?ctx.deadline().remaining(),
            "dial started"
        );

        let (network, remote) = run_with_context(
            ctx,
            RESOLVE,
            resolve_endpoint(&endpoint, self.settings.prefer_ipv6),
        )
        .await
        .inspect_err(|err| {
            warn!(
                target: "spark::transport::dtls",
                %addr,
                error = %err,
                "dial resolution failed"
            )
        })?;

        // 握手超时属于建连失败，以 dial_failed 返回；上下文的取消与截止原样透传。
        let handshake = bounded_by_fallback(
            ctx,
            DIAL,
            self.settings.handshake_timeout(),
            self.engine.dial(ctx, network, remote, &self.credentials),
        );
        let raw = run_with_context(ctx, DIAL, async {
            handshake
                .await
                .map_err(|cause| error::wrap_cause(DIAL, addr, cause))
        })
        .await
        .inspect_err(|err| {
            warn!(
                target: "spark::transport::dtls",
                %addr,
                %network,
                error = %err,
                "dial failed"
            )
        })?;

        let conn = DtlsConn::new(raw);
        debug!(
            target: "spark::transport::dtls",
            local = ?conn.local_multiaddr(),
            remote = ?conn.remote_multiaddr(),
            "raw connection established"
        );

        self.upgrader
            .upgrade_outbound(ctx, self.descriptor(), Box::new(conn), peer)
            .await
    }

    async fn listen(&self, addr: &Multiaddr) -> Result<Box<dyn UpgradedListener>, CoreError> {
        let endpoint = self.udp_endpoint(addr)?;

        let (network, local) = resolve_endpoint(&endpoint, self.settings.prefer_ipv6)
            .await
            .inspect_err(|err| {
                warn!(
                    target: "spark::transport::dtls",
                    %addr,
                    error = %err,
                    "listen resolution failed"
                )
            })?;

        let raw = self
            .engine
            .listen(network, local, &self.credentials)
            .await
            .map_err(|cause| error::wrap_cause(LISTEN, addr, cause))
            .inspect_err(|err| {
                warn!(
                    target: "spark::transport::dtls",
                    %addr,
                    error = %err,
                    "listen failed"
                )
            })?;

        let listener = DtlsListener::new(raw);
        debug!(
            target: "spark::transport::dtls",
            bound = ?listener.listen_multiaddr(),
            "listener bound"
        );
        Ok(self
            .upgrader
            .upgrade_listener(self.descriptor(), Box::new(listener)))
    }

    fn protocols(&self) -> &'static [&'static str] {
        PROTOCOLS
    }

    fn is_proxy(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

impl fmt::Display for DtlsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(NAME)
    }
}

impl fmt::Debug for DtlsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DtlsTransport")
            .field("credentials", &self.credentials)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
    use spark_core::error::{ErrorCategory, codes};
    use spark_transport::{
        Network, RawConnection, RawListener, TransportDescriptor, TransportErrorKind,
    };
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::time::Duration;

    /// 记录调用并按预设返回错误的引擎。
    #[derive(Default)]
    struct ScriptedEngine {
        calls: Mutex<Vec<(Network, SocketAddr)>>,
        hang: bool,
    }

    #[async_trait]
    impl SecureDatagramEngine for ScriptedEngine {
        async fn dial(
            &self,
            _ctx: &CallContext,
            network: Network,
            remote: SocketAddr,
            _config: &DtlsConfig,
        ) -> Result<Box<dyn RawConnection>, CoreError> {
            self.calls.lock().expect("lock").push((network, remote));
            if self.hang {
                std::future::pending::<()>().await;
            }
            Err(CoreError::new(codes::TRANSPORT_IO, "handshake refused")
                .with_category(ErrorCategory::retry_after(Duration::from_millis(100))))
        }

        async fn listen(
            &self,
            network: Network,
            local: SocketAddr,
            _config: &DtlsConfig,
        ) -> Result<Box<dyn RawListener>, CoreError> {
            self.calls.lock().expect("lock").push((network, local));
            Err(CoreError::new(codes::TRANSPORT_IO, "address in use"))
        }
    }

    struct UnreachableUpgrader;

    #[async_trait]
    impl Upgrader for UnreachableUpgrader {
        async fn upgrade_outbound(
            &self,
            _ctx: &CallContext,
            _transport: TransportDescriptor,
            _conn: Box<dyn AddrConnection>,
            _expected: &PeerId,
        ) -> Result<Box<dyn UpgradedConnection>, CoreError> {
            unreachable!("engine never yields a connection in these tests")
        }

        fn upgrade_listener(
            &self,
            _transport: TransportDescriptor,
            _listener: Box<dyn AddrListener>,
        ) -> Box<dyn UpgradedListener> {
            unreachable!("engine never yields a listener in these tests")
        }
    }

    fn credentials() -> DtlsConfig {
        DtlsConfig::new(
            CertificateDer::from(vec![1, 2, 3]),
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(vec![4, 5, 6])),
        )
    }

    fn transport(engine: Arc<ScriptedEngine>) -> DtlsTransport {
        DtlsTransport::new(Arc::new(UnreachableUpgrader), engine, credentials())
    }

    fn addr(text: &str) -> Multiaddr {
        text.parse().expect("valid multiaddr")
    }

    #[test]
    fn metadata_is_fixed() {
        let transport = transport(Arc::default());
        assert_eq!(transport.protocols(), &["dtls"]);
        assert!(!transport.is_proxy());
        assert_eq!(transport.name(), "DTLS");
        assert_eq!(transport.to_string(), "DTLS");
        assert!(!format!("{transport:?}").contains("[4, 5, 6]"));
    }

    #[tokio::test]
    async fn unsupported_address_never_reaches_engine() {
        let engine = Arc::new(ScriptedEngine::default());
        let transport = transport(engine.clone());
        let tcp = addr("/ip4/127.0.0.1/tcp/4001");

        let err = transport
            .dial(&CallContext::default(), &tcp, &PeerId::new("peer"))
            .await
            .err()
            .expect("unsupported");
        assert_eq!(
            TransportErrorKind::of(&err),
            Some(TransportErrorKind::UnsupportedAddress)
        );
        assert!(err.message().contains("/ip4/127.0.0.1/tcp/4001"));

        let err = transport.listen(&tcp).await.err().expect("unsupported");
        assert_eq!(err.code(), codes::TRANSPORT_UNSUPPORTED_ADDRESS);
        assert!(engine.calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn engine_failures_keep_their_category() {
        let engine = Arc::new(ScriptedEngine::default());
        let transport = transport(engine.clone());

        let err = transport
            .dial(
                &CallContext::default(),
                &addr("/ip6/::1/udp/4433/dtls"),
                &PeerId::new("peer"),
            )
            .await
            .err()
            .expect("dial fails");
        assert_eq!(err.code(), codes::TRANSPORT_DIAL);
        assert!(err.category().is_retryable());

        let err = transport
            .listen(&addr("/ip4/127.0.0.1/udp/0/dtls"))
            .await
            .err()
            .expect("listen fails");
        assert_eq!(err.code(), codes::TRANSPORT_LISTEN);

        let calls = engine.calls.lock().expect("lock").clone();
        assert_eq!(
            calls,
            vec![
                (Network::Udp6, "[::1]:4433".parse().expect("socket")),
                (Network::Udp4, "127.0.0.1:0".parse().expect("socket")),
            ]
        );
    }

    #[tokio::test]
    async fn handshake_timeout_bounds_engine_dial() {
        let engine = Arc::new(ScriptedEngine {
            hang: true,
            ..ScriptedEngine::default()
        });
        let settings =
            DtlsTransportConfig::default().with_handshake_timeout(Some(Duration::from_millis(30)));
        let transport = transport(engine)
            .with_settings(settings)
            .expect("valid settings");

        let err = transport
            .dial(
                &CallContext::default(),
                &addr("/ip4/127.0.0.1/udp/9/dtls"),
                &PeerId::new("peer"),
            )
            .await
            .err()
            .expect("timeout");
        assert_eq!(err.code(), codes::TRANSPORT_DIAL);
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert_eq!(
            err.find_cause::<CoreError>().map(CoreError::code),
            Some(codes::TRANSPORT_TIMEOUT)
        );
    }

    #[tokio::test]
    async fn context_deadline_passes_through_unwrapped() {
        let engine = Arc::new(ScriptedEngine {
            hang: true,
            ..ScriptedEngine::default()
        });
        let ctx = CallContext::builder()
            .with_timeout(Duration::from_millis(30))
            .build();

        let err = transport(engine)
            .dial(&ctx, &addr("/ip4/127.0.0.1/udp/9/dtls"), &PeerId::new("peer"))
            .await
            .err()
            .expect("deadline");
        assert_eq!(err.code(), codes::TRANSPORT_TIMEOUT);
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }

    #[tokio::test]
    async fn disabled_dns_rejects_dns_hosts() {
        let transport = transport(Arc::default())
            .with_settings(DtlsTransportConfig::default().with_allow_dns(false))
            .expect("valid settings");
        let dns = addr("/dns4/localhost/udp/1/dtls");
        assert!(!transport.can_handle(&dns));
        let err = transport.listen(&dns).await.err().expect("unsupported");
        assert_eq!(err.code(), codes::TRANSPORT_UNSUPPORTED_ADDRESS);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let err = transport(Arc::default())
            .with_settings(DtlsTransportConfig {
                handshake_timeout_ms: Some(0),
                ..DtlsTransportConfig::default()
            })
            .err()
            .expect("invalid");
        assert_eq!(err.code(), codes::CONFIG_INVALID);
    }
}
