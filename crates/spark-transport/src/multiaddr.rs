use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

/// 结构化地址中的单个协议段。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 传输注册表按“协议段序列”而非 `host:port` 字符串路由地址：同一个 `127.0.0.1:4001`
///   既可以是 `/ip4/127.0.0.1/tcp/4001`，也可以是 `/ip4/127.0.0.1/udp/4001/dtls`，
///   只有保留完整的协议栈信息，注册表才能把地址交给正确的传输实现。
///
/// ## 契约（What）
/// - 主机族：`ip4`、`ip6`、`dns`、`dns4`、`dns6`，携带地址或域名；
/// - 传输层：`tcp`、`udp`，携带端口；
/// - 安全/会话标记：`quic`、`tls`、`dtls`，无取值。
/// - 新增变体只追加不重排，外部匹配需保留通配分支（`non_exhaustive`）。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Protocol {
    Ip4(Ipv4Addr),
    Ip6(Ipv6Addr),
    Dns(String),
    Dns4(String),
    Dns6(String),
    Tcp(u16),
    Udp(u16),
    Quic,
    Tls,
    Dtls,
}

impl Protocol {
    /// 协议名，同时也是文本形式中的标记。
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Ip4(_) => "ip4",
            Protocol::Ip6(_) => "ip6",
            Protocol::Dns(_) => "dns",
            Protocol::Dns4(_) => "dns4",
            Protocol::Dns6(_) => "dns6",
            Protocol::Tcp(_) => "tcp",
            Protocol::Udp(_) => "udp",
            Protocol::Quic => "quic",
            Protocol::Tls => "tls",
            Protocol::Dtls => "dtls",
        }
    }

    /// 是否为主机族协议段（IP 或 DNS）。
    pub fn is_host(&self) -> bool {
        matches!(
            self,
            Protocol::Ip4(_)
                | Protocol::Ip6(_)
                | Protocol::Dns(_)
                | Protocol::Dns4(_)
                | Protocol::Dns6(_)
        )
    }

    /// 是否为 DNS 主机族。
    pub fn is_dns(&self) -> bool {
        matches!(
            self,
            Protocol::Dns(_) | Protocol::Dns4(_) | Protocol::Dns6(_)
        )
    }

    fn parse(name: &str, value: Option<&str>) -> Result<Self, MultiaddrError> {
        let takes_value = matches!(
            name,
            "ip4" | "ip6" | "dns" | "dns4" | "dns6" | "tcp" | "udp"
        );
        let value = match (takes_value, value) {
            (true, Some(value)) => value,
            (true, None) => return Err(MultiaddrError::MissingValue(name.to_string())),
            (false, _) => "",
        };

        let invalid = || MultiaddrError::InvalidValue {
            protocol: name.to_string(),
            value: value.to_string(),
        };

        let protocol = match name {
            "ip4" => Protocol::Ip4(value.parse().map_err(|_| invalid())?),
            "ip6" => Protocol::Ip6(value.parse().map_err(|_| invalid())?),
            "dns" | "dns4" | "dns6" => {
                if value.is_empty() {
                    return Err(invalid());
                }
                let host = value.to_string();
                match name {
                    "dns" => Protocol::Dns(host),
                    "dns4" => Protocol::Dns4(host),
                    _ => Protocol::Dns6(host),
                }
            }
            "tcp" => Protocol::Tcp(value.parse().map_err(|_| invalid())?),
            "udp" => Protocol::Udp(value.parse().map_err(|_| invalid())?),
            "quic" => Protocol::Quic,
            "tls" => Protocol::Tls,
            "dtls" => Protocol::Dtls,
            other => return Err(MultiaddrError::UnknownProtocol(other.to_string())),
        };
        Ok(protocol)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())?;
        match self {
            Protocol::Ip4(addr) => write!(f, "/{addr}"),
            Protocol::Ip6(addr) => write!(f, "/{addr}"),
            Protocol::Dns(host) | Protocol::Dns4(host) | Protocol::Dns6(host) => {
                write!(f, "/{host}")
            }
            Protocol::Tcp(port) | Protocol::Udp(port) => write!(f, "/{port}"),
            Protocol::Quic | Protocol::Tls | Protocol::Dtls => Ok(()),
        }
    }
}

/// 文本地址解析失败的原因。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultiaddrError {
    #[error("多地址必须以 `/` 开头")]
    MissingLeadingSlash,
    #[error("多地址包含空协议段")]
    EmptySegment,
    #[error("未知协议 `{0}`")]
    UnknownProtocol(String),
    #[error("协议 `{0}` 缺少取值")]
    MissingValue(String),
    #[error("协议 `{protocol}` 的取值 `{value}` 非法")]
    InvalidValue { protocol: String, value: String },
}

/// 结构化地址：有序的协议段序列。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 作为整个传输栈的统一寻址语言：注册表据此路由，传输实现据此拆解出下层端点，
///   连接据此回报本地/对端地址。
///
/// ## 逻辑（How）
/// - 内部以 `Vec<Protocol>` 保存；所有变换（`encapsulate`/`decapsulate`）返回新值，
///   原值保持不可变。
/// - 文本格式 `/ip4/127.0.0.1/udp/4001/dtls`，`Display` 与 `FromStr` 互逆。
///
/// ## 契约（What）
/// - `encapsulate(other)`：在末尾追加 `other` 的全部协议段；
/// - `decapsulate(suffix)`：移除 `suffix` 最后一次出现的位置及其后的全部协议段；
///   若未出现则返回原地址的副本；
/// - `from_udp_socket_addr`/`from_tcp_socket_addr`：由原生套接字地址构造。
///
/// ## 风险（Trade-offs）
/// - 不实现二进制编码；跨进程传递时使用文本形式。
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Multiaddr {
    segments: Vec<Protocol>,
}

impl Multiaddr {
    /// 空地址，文本形式为 `/`。
    pub fn empty() -> Self {
        Self::default()
    }

    /// 以 UDP 套接字地址构造 `/ipX/<ip>/udp/<port>`。
    pub fn from_udp_socket_addr(addr: SocketAddr) -> Self {
        Self::from_ip(addr.ip()).with(Protocol::Udp(addr.port()))
    }

    /// 以 TCP 套接字地址构造 `/ipX/<ip>/tcp/<port>`。
    pub fn from_tcp_socket_addr(addr: SocketAddr) -> Self {
        Self::from_ip(addr.ip()).with(Protocol::Tcp(addr.port()))
    }

    fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Protocol::Ip4(v4).into(),
            IpAddr::V6(v6) => Protocol::Ip6(v6).into(),
        }
    }

    /// 追加协议段并返回自身，便于链式构造。
    pub fn with(mut self, protocol: Protocol) -> Self {
        self.segments.push(protocol);
        self
    }

    /// 协议段迭代器。
    pub fn iter(&self) -> std::slice::Iter<'_, Protocol> {
        self.segments.iter()
    }

    /// 以切片形式访问协议段，便于模式匹配。
    pub fn segments(&self) -> &[Protocol] {
        &self.segments
    }

    /// 协议名序列。
    pub fn protocol_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.segments.iter().map(Protocol::name)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// 末尾协议段。
    pub fn last(&self) -> Option<&Protocol> {
        self.segments.last()
    }

    /// 在末尾追加 `other` 的全部协议段，返回新地址。
    pub fn encapsulate(&self, other: &Multiaddr) -> Multiaddr {
        let mut segments = Vec::with_capacity(self.len() + other.len());
        segments.extend_from_slice(&self.segments);
        segments.extend_from_slice(&other.segments);
        Multiaddr { segments }
    }

    /// 移除 `suffix` 最后一次出现处及其后的全部协议段，返回新地址。
    pub fn decapsulate(&self, suffix: &Multiaddr) -> Multiaddr {
        match self.rfind(suffix) {
            Some(index) => Multiaddr {
                segments: self.segments[..index].to_vec(),
            },
            None => self.clone(),
        }
    }

    /// 是否以 `suffix` 结尾。
    pub fn ends_with(&self, suffix: &Multiaddr) -> bool {
        self.segments.ends_with(&suffix.segments)
    }

    /// 当地址恰为 `/ipX/<ip>/udp/<port>` 时返回对应的套接字地址。
    pub fn to_udp_socket_addr(&self) -> Option<SocketAddr> {
        match self.segments.as_slice() {
            [Protocol::Ip4(ip), Protocol::Udp(port)] => Some(SocketAddr::new((*ip).into(), *port)),
            [Protocol::Ip6(ip), Protocol::Udp(port)] => Some(SocketAddr::new((*ip).into(), *port)),
            _ => None,
        }
    }

    fn rfind(&self, suffix: &Multiaddr) -> Option<usize> {
        let needle = suffix.segments.as_slice();
        if needle.is_empty() || needle.len() > self.segments.len() {
            return None;
        }
        (0..=self.segments.len() - needle.len())
            .rev()
            .find(|&start| &self.segments[start..start + needle.len()] == needle)
    }
}

impl From<Protocol> for Multiaddr {
    fn from(protocol: Protocol) -> Self {
        Multiaddr {
            segments: vec![protocol],
        }
    }
}

impl FromIterator<Protocol> for Multiaddr {
    fn from_iter<I: IntoIterator<Item = Protocol>>(iter: I) -> Self {
        Multiaddr {
            segments: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Multiaddr {
    type Item = &'a Protocol;
    type IntoIter = std::slice::Iter<'a, Protocol>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

impl FromStr for Multiaddr {
    type Err = MultiaddrError;

    /// 解析文本地址。
    ///
    /// - 必须以 `/` 开头；允许单个结尾 `/`；
    /// - `/` 解析为空地址；中间出现 `//` 视为空协议段错误。
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let rest = input
            .strip_prefix('/')
            .ok_or(MultiaddrError::MissingLeadingSlash)?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        if rest.is_empty() {
            return Ok(Multiaddr::empty());
        }

        let mut tokens = rest.split('/');
        let mut segments = Vec::new();
        while let Some(name) = tokens.next() {
            if name.is_empty() {
                return Err(MultiaddrError::EmptySegment);
            }
            let needs_value = matches!(
                name,
                "ip4" | "ip6" | "dns" | "dns4" | "dns6" | "tcp" | "udp"
            );
            let value = if needs_value { tokens.next() } else { None };
            segments.push(Protocol::parse(name, value)?);
        }
        Ok(Multiaddr { segments })
    }
}

impl TryFrom<&str> for Multiaddr {
    type Error = MultiaddrError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for protocol in &self.segments {
            write!(f, "{protocol}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multiaddr({self})")
    }
}
