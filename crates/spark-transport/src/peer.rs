use std::fmt;
use std::sync::Arc;

/// 对端身份标识。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 升级器在安全握手后需要比对“期望的对端”与“实际认证出的对端”；传输层只负责携带，
///   不解释其内部结构。
///
/// ## 契约（What）
/// - 以不可变字符串保存，克隆为常数成本；
/// - 相等性按字节比较，`Display` 输出原文。
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Arc<str>);

impl PeerId {
    /// 以任意字符串构造身份标识。
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// 以字符串视图访问。
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 以字节视图访问，便于写入握手报文。
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PeerId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}
