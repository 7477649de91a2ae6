//! DTLS 传输的运行参数。
//!
//! # 教案级说明
//!
//! ## 意图（Why）
//! - 握手超时、是否接受 DNS 地址、DNS 地址族偏好属于部署期决策，需要能从 TOML 配置文件
//!   加载，而不是硬编码在传输实现中。
//!
//! ## 契约（What）
//! - 缺省字段取默认值：握手超时 10s、接受 DNS、优先 IPv4；
//! - 未知字段被拒绝，避免拼写错误被静默忽略；
//! - [`DtlsTransportConfig::validate`] 拒绝 0 毫秒的握手超时。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use spark_core::error::{CoreError, ErrorCategory, codes};
use thiserror::Error;

const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// DTLS 传输配置。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DtlsTransportConfig {
    /// 上下文未设置截止时间时，引擎拨号（含握手）的兜底超时；`None` 表示不设限。
    pub handshake_timeout_ms: Option<u64>,
    /// 是否接受 `/dns`、`/dns4`、`/dns6` 主机族。
    pub allow_dns: bool,
    /// `/dns` 主机同时解析出两个地址族时是否优先 IPv6。
    pub prefer_ipv6: bool,
}

impl Default for DtlsTransportConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: Some(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            allow_dns: true,
            prefer_ipv6: false,
        }
    }
}

/// 配置加载或校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DTLS 配置解析失败: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("handshake_timeout_ms 必须大于 0")]
    ZeroHandshakeTimeout,
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        CoreError::new(codes::CONFIG_INVALID, err.to_string())
            .with_category(ErrorCategory::NonRetryable)
            .with_cause(err)
    }
}

impl DtlsTransportConfig {
    /// 从 TOML 文本加载并校验。
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验取值范围。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handshake_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroHandshakeTimeout);
        }
        Ok(())
    }

    /// 握手兜底超时。
    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout_ms =
            timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_allow_dns(mut self, allow: bool) -> Self {
        self.allow_dns = allow;
        self
    }

    pub fn with_prefer_ipv6(mut self, prefer: bool) -> Self {
        self.prefer_ipv6 = prefer;
        self
    }
}
