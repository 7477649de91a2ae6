//! 测试辅助（`test-util` feature）。
//!
//! # 教案级说明
//!
//! ## 意图（Why）
//! - 集成测试需要在不引入真实 DTLS 实现的前提下跑通“监听 → 拨号 → 升级 → 收发”全链路；
//!   本模块提供不加密的引擎、明文升级器以及自签名证书生成，全部走真实 UDP 回环。
//!
//! ## 契约（What）
//! - [`PlaintextDatagramEngine`]：实现 [`SecureDatagramEngine`](crate::SecureDatagramEngine)；
//! - [`InsecureUpgrader`]：实现 [`Upgrader`](spark_transport::Upgrader)；
//! - [`generate_credentials`]：以 `rcgen` 生成 `localhost` 自签名证书与 PKCS#8 私钥。
//!
//! ## 风险（Trade-offs）
//! - 任何生产路径都不应启用该 feature。

mod engine;
mod upgrader;

use rustls_pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

pub use engine::PlaintextDatagramEngine;
pub use upgrader::{InsecureConnection, InsecureListener, InsecureUpgrader};

use crate::engine::DtlsConfig;

/// 生成一份自签名凭据。
pub fn generate_credentials() -> Result<DtlsConfig, rcgen::Error> {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
    let private_key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    Ok(DtlsConfig::new(cert.der().clone(), private_key))
}
