#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "spark-transport: 可插拔传输的统一契约。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：DTLS、TCP、QUIC 等传输需要向 P2P 宿主栈暴露同一套“拨号/监听/升级”接口，宿主栈才能按地址热插拔选择传输。"]
#![doc = "- **What**：定义结构化地址 [`Multiaddr`]、对端标识 [`PeerId`]、原始/带地址的连接与监听器、连接升级器，以及 [`Transport`] 契约与 [`TransportRegistry`]。"]
#![doc = "- **How**：全部契约为 `async_trait` 对象安全 trait，错误统一为 `spark_core::CoreError`，取消/截止通过 `CallContext` 传递。"]

pub mod connection;
pub mod error;
pub mod listener;
pub mod multiaddr;
pub mod peer;
pub mod registry;
pub mod transport;
pub mod upgrade;

pub use connection::{AddrConnection, ByteStream, Network, RawConnection};
pub use error::TransportErrorKind;
pub use listener::{AddrListener, RawListener};
pub use multiaddr::{Multiaddr, MultiaddrError, Protocol};
pub use peer::PeerId;
pub use registry::TransportRegistry;
pub use transport::{Transport, TransportDescriptor};
pub use upgrade::{UpgradedConnection, UpgradedListener, Upgrader};
