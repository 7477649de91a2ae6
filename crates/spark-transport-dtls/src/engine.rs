use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use spark_core::prelude::{CallContext, CoreError};
use spark_transport::{Network, RawConnection, RawListener};

/// 引擎握手所需的本地凭据。
///
/// # 契约（What）
/// - 证书与私钥均为 DER 编码，生命周期为 `'static`；
/// - `Debug` 输出不包含私钥内容。
pub struct DtlsConfig {
    certificate: CertificateDer<'static>,
    private_key: PrivateKeyDer<'static>,
}

impl DtlsConfig {
    pub fn new(certificate: CertificateDer<'static>, private_key: PrivateKeyDer<'static>) -> Self {
        Self {
            certificate,
            private_key,
        }
    }

    /// 本地证书。
    pub fn certificate(&self) -> &CertificateDer<'static> {
        &self.certificate
    }

    /// 本地私钥。
    pub fn private_key(&self) -> &PrivateKeyDer<'static> {
        &self.private_key
    }
}

impl Clone for DtlsConfig {
    fn clone(&self) -> Self {
        Self {
            certificate: self.certificate.clone(),
            private_key: self.private_key.clone_key(),
        }
    }
}

impl fmt::Debug for DtlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DtlsConfig")
            .field("certificate_len", &self.certificate.as_ref().len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// 安全数据报引擎：DTLS 记录层与握手的提供者。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 本 crate 只做“地址 ↔ 引擎 ↔ 升级器”的适配，不实现任何密码学；真正的 DTLS 协议由
///   外部引擎提供，通过该 trait 注入。
///
/// ## 契约（What）
/// - `dial`：在 `network` 上与 `remote` 完成握手，返回可读写的原始连接；应遵守 `ctx`
///   的取消与截止（传输实现还会在外层再施加一次约束）；
/// - `listen`：在 `local` 上绑定，返回产出已握手连接的监听器；端口 0 由系统分配；
/// - 错误以 [`CoreError`] 返回，其分类会被传输实现原样保留。
#[async_trait]
pub trait SecureDatagramEngine: Send + Sync + 'static {
    /// 发起握手。
    async fn dial(
        &self,
        ctx: &CallContext,
        network: Network,
        remote: SocketAddr,
        config: &DtlsConfig,
    ) -> Result<Box<dyn RawConnection>, CoreError>;

    /// 绑定监听。
    async fn listen(
        &self,
        network: Network,
        local: SocketAddr,
        config: &DtlsConfig,
    ) -> Result<Box<dyn RawListener>, CoreError>;
}
