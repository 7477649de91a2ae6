//! 地址判定的性质测试：`can_handle` 只接受 `/<host>/udp/<port>/dtls`。

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use proptest::prelude::*;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use spark_transport::{Multiaddr, PeerId, Protocol, Transport};
use spark_transport_dtls::testing::{InsecureUpgrader, PlaintextDatagramEngine};
use spark_transport_dtls::{DtlsConfig, DtlsTransport, is_dtls_multiaddr};

fn transport() -> DtlsTransport {
    DtlsTransport::new(
        Arc::new(InsecureUpgrader::new(PeerId::new("prop"))),
        Arc::new(PlaintextDatagramEngine::new()),
        DtlsConfig::new(
            CertificateDer::from(vec![0x30, 0x00]),
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(vec![0x30, 0x00])),
        ),
    )
}

fn host() -> impl Strategy<Value = Protocol> {
    prop_oneof![
        any::<[u8; 4]>().prop_map(|octets| Protocol::Ip4(Ipv4Addr::from(octets))),
        any::<[u16; 8]>().prop_map(|segments| Protocol::Ip6(Ipv6Addr::from(segments))),
        "[a-z]{1,12}\\.example".prop_map(Protocol::Dns),
        "[a-z]{1,12}\\.example".prop_map(Protocol::Dns4),
        "[a-z]{1,12}\\.example".prop_map(Protocol::Dns6),
    ]
}

fn any_protocol() -> impl Strategy<Value = Protocol> {
    prop_oneof![
        host(),
        any::<u16>().prop_map(Protocol::Udp),
        any::<u16>().prop_map(Protocol::Tcp),
        Just(Protocol::Dtls),
        Just(Protocol::Quic),
        Just(Protocol::Tls),
    ]
}

proptest! {
    #[test]
    fn well_formed_dtls_addresses_are_accepted(host in host(), port in any::<u16>()) {
        let addr: Multiaddr = [host, Protocol::Udp(port), Protocol::Dtls].into_iter().collect();
        prop_assert!(transport().can_handle(&addr));

        // 文本往返后仍被接受。
        let reparsed: Multiaddr = addr.to_string().parse().expect("display output parses");
        prop_assert!(is_dtls_multiaddr(&reparsed));
    }

    #[test]
    fn only_the_exact_shape_is_accepted(segments in prop::collection::vec(any_protocol(), 0..6)) {
        let expected = segments.len() == 3
            && segments[0].is_host()
            && matches!(segments[1], Protocol::Udp(_))
            && segments[2] == Protocol::Dtls;
        let addr: Multiaddr = segments.into_iter().collect();
        prop_assert_eq!(transport().can_handle(&addr), expected);
    }

    #[test]
    fn stripping_dtls_yields_the_udp_endpoint(host in host(), port in any::<u16>()) {
        let endpoint: Multiaddr = [host, Protocol::Udp(port)].into_iter().collect();
        let full = endpoint.encapsulate(&Protocol::Dtls.into());
        prop_assert_eq!(full.decapsulate(&Protocol::Dtls.into()), endpoint);
    }
}
