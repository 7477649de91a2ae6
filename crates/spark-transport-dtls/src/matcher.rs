use std::sync::OnceLock;

use spark_transport::{Multiaddr, Protocol};

/// `/dtls` 标记，进程内惰性构建一次，之后只读共享。
pub(crate) fn dtls_marker() -> &'static Multiaddr {
    static MARKER: OnceLock<Multiaddr> = OnceLock::new();
    MARKER.get_or_init(|| Multiaddr::from(Protocol::Dtls))
}

/// 判断地址是否为 `/<host>/udp/<port>/dtls` 形态（接受 DNS 主机族）。
///
/// # 示例
/// ```rust
/// use spark_transport::Multiaddr;
/// use spark_transport_dtls::is_dtls_multiaddr;
///
/// let addr: Multiaddr = "/ip4/127.0.0.1/udp/4433/dtls".parse().unwrap();
/// assert!(is_dtls_multiaddr(&addr));
/// let tcp: Multiaddr = "/ip4/127.0.0.1/tcp/4433".parse().unwrap();
/// assert!(!is_dtls_multiaddr(&tcp));
/// ```
pub fn is_dtls_multiaddr(addr: &Multiaddr) -> bool {
    matches_dtls(addr, true)
}

/// 形态判定；`allow_dns = false` 时仅接受 IP 字面量主机。
pub(crate) fn matches_dtls(addr: &Multiaddr, allow_dns: bool) -> bool {
    match addr.segments() {
        [host, Protocol::Udp(_), Protocol::Dtls] if host.is_host() => {
            allow_dns || !host.is_dns()
        }
        _ => false,
    }
}
