use std::collections::HashMap;
use std::sync::Arc;

use spark_core::contract::CallContext;
use spark_core::error::{CoreError, codes};
use tracing::debug;

use crate::error::unsupported_address;
use crate::multiaddr::Multiaddr;
use crate::peer::PeerId;
use crate::transport::Transport;
use crate::upgrade::{UpgradedConnection, UpgradedListener};

/// 传输注册表：按地址中的协议段把拨号/监听请求路由到对应传输。
///
/// # 教案级注释
///
/// ## 逻辑（How）
/// - 注册时以 [`Transport::protocols`] 建立“协议名 → 传输”索引，同一协议名只能被认领一次；
/// - 路由时自地址末尾向前扫描协议段，命中的第一个已注册协议决定候选传输，
///   再由候选传输的 `can_handle` 做最终判定。末尾优先使 `/ip4/../udp/../dtls`
///   落到 DTLS 而非可能注册了 `udp` 的裸 UDP 传输。
///
/// ## 契约（What）
/// - 找不到传输时 `dial`/`listen` 返回 `spark.transport.unsupported_address`，不产生 I/O；
/// - 注册表构建完成后只读，可通过 `Arc` 在任务间共享。
#[derive(Default)]
pub struct TransportRegistry {
    transports: Vec<Arc<dyn Transport>>,
    by_protocol: HashMap<&'static str, usize>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册传输；若其任一协议名已被认领则拒绝整个注册。
    pub fn register(&mut self, transport: Arc<dyn Transport>) -> Result<(), CoreError> {
        if let Some(taken) = transport
            .protocols()
            .iter()
            .find(|protocol| self.by_protocol.contains_key(*protocol))
        {
            return Err(CoreError::new(
                codes::CONFIG_INVALID,
                format!("协议 `{taken}` 已由其他传输注册"),
            ));
        }

        let index = self.transports.len();
        for protocol in transport.protocols() {
            self.by_protocol.insert(*protocol, index);
        }
        debug!(
            target: "spark::transport::registry",
            transport = transport.name(),
            protocols = ?transport.protocols(),
            "transport registered"
        );
        self.transports.push(transport);
        Ok(())
    }

    /// 为地址挑选传输。
    pub fn transport_for(&self, addr: &Multiaddr) -> Option<&Arc<dyn Transport>> {
        let index = addr
            .iter()
            .rev()
            .find_map(|protocol| self.by_protocol.get(protocol.name()))?;
        let transport = &self.transports[*index];
        transport.can_handle(addr).then_some(transport)
    }

    /// 通过匹配的传输拨号。
    pub async fn dial(
        &self,
        ctx: &CallContext,
        addr: &Multiaddr,
        peer: &PeerId,
    ) -> Result<Box<dyn UpgradedConnection>, CoreError> {
        match self.transport_for(addr) {
            Some(transport) => transport.dial(ctx, addr, peer).await,
            None => Err(unsupported_address("registry", addr)),
        }
    }

    /// 通过匹配的传输监听。
    pub async fn listen(&self, addr: &Multiaddr) -> Result<Box<dyn UpgradedListener>, CoreError> {
        match self.transport_for(addr) {
            Some(transport) => transport.listen(addr).await,
            None => Err(unsupported_address("registry", addr)),
        }
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multiaddr::Protocol;
    use crate::{TransportErrorKind, error};
    use async_trait::async_trait;

    struct Stub {
        name: &'static str,
        protocols: &'static [&'static str],
        last: Protocol,
    }

    #[async_trait]
    impl Transport for Stub {
        fn can_handle(&self, addr: &Multiaddr) -> bool {
            addr.last() == Some(&self.last)
        }

        async fn dial(
            &self,
            _ctx: &CallContext,
            addr: &Multiaddr,
            _peer: &PeerId,
        ) -> Result<Box<dyn UpgradedConnection>, CoreError> {
            Err(error::closed(format!("{} dialed {addr}", self.name)))
        }

        async fn listen(&self, addr: &Multiaddr) -> Result<Box<dyn UpgradedListener>, CoreError> {
            Err(error::closed(format!("{} listened {addr}", self.name)))
        }

        fn protocols(&self) -> &'static [&'static str] {
            self.protocols
        }

        fn is_proxy(&self) -> bool {
            false
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    fn registry() -> TransportRegistry {
        let mut registry = TransportRegistry::new();
        registry
            .register(Arc::new(Stub {
                name: "UDP",
                protocols: &["udp"],
                last: Protocol::Udp(0),
            }))
            .expect("udp");
        registry
            .register(Arc::new(Stub {
                name: "DTLS",
                protocols: &["dtls"],
                last: Protocol::Dtls,
            }))
            .expect("dtls");
        registry
    }

    #[test]
    fn routes_by_trailing_protocol() {
        let registry = registry();
        let addr: Multiaddr = "/ip4/127.0.0.1/udp/9/dtls".parse().expect("addr");
        let chosen = registry.transport_for(&addr).expect("transport");
        assert_eq!(chosen.name(), "DTLS");

        let tcp: Multiaddr = "/ip4/127.0.0.1/tcp/9".parse().expect("addr");
        assert!(registry.transport_for(&tcp).is_none());
    }

    #[test]
    fn duplicate_protocol_is_rejected() {
        let mut registry = registry();
        let err = registry
            .register(Arc::new(Stub {
                name: "DTLS2",
                protocols: &["dtls"],
                last: Protocol::Dtls,
            }))
            .expect_err("duplicate");
        assert_eq!(err.code(), codes::CONFIG_INVALID);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn dial_without_transport_is_unsupported() {
        let registry = registry();
        let addr: Multiaddr = "/ip4/127.0.0.1/tcp/9".parse().expect("addr");
        let err = registry
            .dial(&CallContext::default(), &addr, &PeerId::new("p"))
            .await
            .err()
            .expect("unsupported");
        assert_eq!(
            TransportErrorKind::of(&err),
            Some(TransportErrorKind::UnsupportedAddress)
        );

        let err = registry
            .listen(&"/ip4/127.0.0.1/udp/9/dtls".parse().expect("addr"))
            .await
            .err()
            .expect("stub listen fails");
        assert!(err.message().starts_with("DTLS listened"));
    }
}
