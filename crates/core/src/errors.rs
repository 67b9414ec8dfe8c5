use thiserror::Error;

/// 数据面错误类型定义
#[derive(Debug, Error)]
pub enum EventingError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("无效的CloudEvent: {0}")]
    MalformedEvent(String),

    #[error("通道未找到: {name}")]
    ChannelNotFound { name: String },

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("无效的订阅契约: {0}")]
    InvalidContract(String),
}

impl EventingError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEvent(message.into())
    }

    pub fn channel_not_found(name: impl Into<String>) -> Self {
        Self::ChannelNotFound { name: name.into() }
    }

    /// 调用方重试可能成功的错误（存储抖动等）
    pub fn is_transient(&self) -> bool {
        matches!(self, EventingError::Database(_) | EventingError::Storage(_))
    }
}

impl From<serde_json::Error> for EventingError {
    fn from(e: serde_json::Error) -> Self {
        EventingError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type Result<T> = std::result::Result<T, EventingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EventingError::channel_not_found("orders");
        assert_eq!(err.to_string(), "通道未找到: orders");

        let err = EventingError::malformed("缺少属性 id");
        assert_eq!(err.to_string(), "无效的CloudEvent: 缺少属性 id");
    }

    #[test]
    fn test_is_transient() {
        assert!(EventingError::Storage("disk full".to_string()).is_transient());
        assert!(!EventingError::malformed("x").is_transient());
        assert!(!EventingError::channel_not_found("x").is_transient());
    }
}
