//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。路径未命中不是错误，
//! 由 [`crate::content::path::Resolved::Absent`] 表示。

use std::fmt;

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// 配置错误（缺少模式所需字段等），不会被静默补默认值
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 标记片段结构不完整，字段原样透传
    #[error("标记解析错误: {0}")]
    MarkupParse(String),

    /// 翻译后端调用失败（单字段或单批次）
    #[error("翻译后端错误: {0}")]
    Backend(String),

    /// 缓存存储不可用，只在缓存层内部出现
    #[error("缓存不可用: {0}")]
    CacheUnavailable(String),

    /// 路径表达式语法错误
    #[error("路径无效: {0}")]
    InvalidPath(String),

    /// 记录中所有可翻译字段均失败
    #[error("全部字段翻译失败: {0}")]
    AllFieldsFailed(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// 超时错误
    #[error("操作超时: {0}")]
    Timeout(String),

    /// 配置存储错误
    #[error("存储错误: {0}")]
    Store(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    ///
    /// 管道本身从不重试，此标记留给后端协作方的重试策略使用。
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::Backend(_) => true,
            TranslationError::Timeout(_) => true,
            TranslationError::CacheUnavailable(_) => true,
            TranslationError::Store(_) => true,
            TranslationError::Configuration(_) => false,
            TranslationError::MarkupParse(_) => false,
            TranslationError::InvalidPath(_) => false,
            TranslationError::AllFieldsFailed(_) => false,
            TranslationError::Serialization(_) => false,
            TranslationError::Internal(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::Configuration(_) => ErrorSeverity::Critical,
            TranslationError::MarkupParse(_) => ErrorSeverity::Warning,
            TranslationError::Backend(_) => ErrorSeverity::Error,
            TranslationError::CacheUnavailable(_) => ErrorSeverity::Warning,
            TranslationError::InvalidPath(_) => ErrorSeverity::Info,
            TranslationError::AllFieldsFailed(_) => ErrorSeverity::Critical,
            TranslationError::Serialization(_) => ErrorSeverity::Error,
            TranslationError::Timeout(_) => ErrorSeverity::Warning,
            TranslationError::Store(_) => ErrorSeverity::Error,
            TranslationError::Internal(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::Configuration(_) => ErrorCategory::Configuration,
            TranslationError::MarkupParse(_) => ErrorCategory::Parsing,
            TranslationError::Backend(_) => ErrorCategory::Service,
            TranslationError::CacheUnavailable(_) => ErrorCategory::Cache,
            TranslationError::InvalidPath(_) => ErrorCategory::Input,
            TranslationError::AllFieldsFailed(_) => ErrorCategory::Service,
            TranslationError::Serialization(_) => ErrorCategory::Serialization,
            TranslationError::Timeout(_) => ErrorCategory::Timeout,
            TranslationError::Store(_) => ErrorCategory::Storage,
            TranslationError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let new_msg = format!("{} (上下文: {})", self.message(), context);

        match &mut self {
            TranslationError::Configuration(msg)
            | TranslationError::MarkupParse(msg)
            | TranslationError::Backend(msg)
            | TranslationError::CacheUnavailable(msg)
            | TranslationError::InvalidPath(msg)
            | TranslationError::AllFieldsFailed(msg)
            | TranslationError::Serialization(msg)
            | TranslationError::Timeout(msg)
            | TranslationError::Store(msg)
            | TranslationError::Internal(msg) => *msg = new_msg,
        }

        self
    }

    /// 错误的原始消息（不含类别前缀）
    pub fn message(&self) -> &str {
        match self {
            TranslationError::Configuration(msg)
            | TranslationError::MarkupParse(msg)
            | TranslationError::Backend(msg)
            | TranslationError::CacheUnavailable(msg)
            | TranslationError::InvalidPath(msg)
            | TranslationError::AllFieldsFailed(msg)
            | TranslationError::Serialization(msg)
            | TranslationError::Timeout(msg)
            | TranslationError::Store(msg)
            | TranslationError::Internal(msg) => msg,
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

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Cache,
    Service,
    Timeout,
    Parsing,
    Serialization,
    Storage,
    Internal,
}

impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::Store(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::Serialization(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::Configuration(format!("TOML解析错误: {}", error))
    }
}

impl From<tokio::time::error::Elapsed> for TranslationError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        TranslationError::Timeout(format!("异步操作超时: {}", error))
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误，不改变错误本身
    pub fn log_error(error: &TranslationError) {
        let category = error.category();
        match error.severity() {
            ErrorSeverity::Info => tracing::info!(category = ?category, "翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!(category = ?category, "翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!(category = ?category, "翻译错误: {}", error),
            ErrorSeverity::Critical => {
                tracing::error!(category = ?category, "翻译严重错误: {}", error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TranslationError::Backend("503".into()).is_retryable());
        assert!(!TranslationError::Configuration("x".into()).is_retryable());
        assert!(!TranslationError::MarkupParse("x".into()).is_retryable());
    }

    #[test]
    fn test_context_keeps_variant() {
        let err = TranslationError::Backend("超时".into()).with_context("title");
        assert!(matches!(err, TranslationError::Backend(_)));
        assert!(err.message().contains("title"));
        assert_eq!(err.category(), ErrorCategory::Service);
    }

    #[test]
    fn test_configuration_is_critical() {
        let err = TranslationError::Configuration("primaryCollectionName 未设置".into());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }
}
