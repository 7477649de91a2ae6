#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = r#"
# spark-transport-dtls

## 模块使命（Why）
- **接入安全数据报**：让 P2P 宿主栈像使用 TCP/QUIC 一样，通过 `/ip4/<ip>/udp/<port>/dtls`
  形态的结构化地址拨号与监听 DTLS 端点。
- **职责收敛**：DTLS 记录层与握手由外部 [`SecureDatagramEngine`] 提供，安全与多路复用协商由
  宿主栈注入的 [`Upgrader`](spark_transport::Upgrader) 完成；本 crate 只做地址适配、
  连接包装与流程编排。

## 核心契约（What）
- [`DtlsTransport`] 实现 [`Transport`](spark_transport::Transport)：`can_handle` 纯函数判定、
  `dial`/`listen` 严格按“校验 → 剥离 `/dtls` → 解析 → 引擎 → 包装 → 升级”执行；
- [`DtlsConn`]/[`DtlsListener`] 原样委托读写，并把原生 `SocketAddr` 回报为 `/dtls` 结构化地址；
- [`DtlsTransportConfig`] 可从 TOML 加载握手超时与 DNS 策略。

## 实现策略（How）
- 取消与截止由 `CallContext` 驱动，集中在内部 `run_with_context` 中与引擎握手竞速；
- 日志统一使用 `tracing`，target 为 `spark::transport::dtls`；
- 启用 `test-util` feature 后可获得明文引擎 `testing::PlaintextDatagramEngine`、
  明文升级器 `testing::InsecureUpgrader` 与证书生成辅助，供集成测试端到端验证。
"#]

mod config;
mod engine;
mod error;
mod matcher;
mod transport;
mod util;
mod wrap;

#[cfg(feature = "test-util")]
pub mod testing;

pub use config::{ConfigError, DtlsTransportConfig};
pub use engine::{DtlsConfig, SecureDatagramEngine};
pub use matcher::is_dtls_multiaddr;
pub use transport::DtlsTransport;
pub use wrap::{DtlsConn, DtlsListener};
