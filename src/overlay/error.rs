//! 覆盖层统一错误处理
//!
//! 引擎对宿主的公共操作从不向外抛出错误：这里的错误类型只在内部流转，
//! 最终被记录日志并降级为“未翻译”状态。

use std::fmt;

use thiserror::Error;

/// 覆盖层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OverlayError {
    /// 无法识别的显示模式
    #[error("无效的翻译模式: {0}")]
    InvalidMode(String),

    /// 观察请求缺少文档根节点
    #[error("未提供需要观察的文档")]
    MissingDocument,

    /// 翻译服务返回空结果
    #[error("翻译结果为空: {0}")]
    EmptyTranslation(String),

    /// 结构化翻译返回的分段数量与请求不一致
    #[error("结构化翻译分段数量不匹配: 期望 {expected}, 实际 {actual}")]
    StructureMismatch { expected: usize, actual: usize },

    /// 翻译服务不支持结构化请求
    #[error("翻译服务不支持结构化请求")]
    StructuredUnsupported,

    /// 翻译服务错误
    #[error("翻译服务错误: {0}")]
    Service(String),

    /// 网络错误
    #[error("网络错误: {0}")]
    Network(String),

    /// 未注册的翻译单元
    #[error("未知的翻译单元: {0}")]
    UnknownUnit(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),
}

impl OverlayError {
    /// 下一次可见性扫描时是否会自动重试
    ///
    /// 失败的单元不会留下缓存记录，因此暂时性错误会在单元再次进入视口时重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            OverlayError::EmptyTranslation(_) => true,
            OverlayError::StructureMismatch { .. } => true,
            OverlayError::StructuredUnsupported => true,
            OverlayError::Service(_) => true,
            OverlayError::Network(_) => true,
            OverlayError::InvalidMode(_) => false,
            OverlayError::MissingDocument => false,
            OverlayError::UnknownUnit(_) => false,
            OverlayError::Config(_) => false,
            OverlayError::Parse(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            OverlayError::EmptyTranslation(_) => ErrorSeverity::Info,
            OverlayError::StructuredUnsupported => ErrorSeverity::Info,
            OverlayError::StructureMismatch { .. } => ErrorSeverity::Warning,
            OverlayError::InvalidMode(_) => ErrorSeverity::Warning,
            OverlayError::MissingDocument => ErrorSeverity::Warning,
            OverlayError::UnknownUnit(_) => ErrorSeverity::Warning,
            OverlayError::Network(_) => ErrorSeverity::Warning,
            OverlayError::Service(_) => ErrorSeverity::Error,
            OverlayError::Parse(_) => ErrorSeverity::Error,
            OverlayError::Config(_) => ErrorSeverity::Critical,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(self, context: T) -> Self {
        let new_msg = format!("{} (上下文: {})", self, context);

        match self {
            OverlayError::Service(_) => OverlayError::Service(new_msg),
            OverlayError::Network(_) => OverlayError::Network(new_msg),
            OverlayError::Config(_) => OverlayError::Config(new_msg),
            OverlayError::Parse(_) => OverlayError::Parse(new_msg),
            other => other,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 覆盖层操作的结果类型
pub type OverlayResult<T> = Result<T, OverlayError>;

impl From<std::io::Error> for OverlayError {
    fn from(err: std::io::Error) -> Self {
        OverlayError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for OverlayError {
    fn from(err: serde_json::Error) -> Self {
        OverlayError::Parse(format!("JSON: {}", err))
    }
}

#[cfg(feature = "deeplx")]
impl From<reqwest::Error> for OverlayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            OverlayError::Network(err.to_string())
        } else {
            OverlayError::Service(err.to_string())
        }
    }
}
