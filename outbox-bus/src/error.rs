//! 统一错误定义
//!
//! 覆盖 Outbox 写入、发布轮询、事件总线与类型化处理器四条链路，
//! 底层错误通过 `source` 保留因果链，便于上层 `?` 透传与定位。
//!
use thiserror::Error;

/// 可跨线程传递的底层错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OutboxError {
    // --- 参数/配置 ---
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    // --- Outbox ---
    #[error("outbox write failed: {source}")]
    WriteFailed {
        #[source]
        source: BoxError,
    },
    #[error("transaction misuse: {reason}")]
    TransactionMisuse { reason: String },
    #[error("outbox store error: {reason}")]
    Store { reason: String },

    // --- 事件总线 ---
    #[error("publish failed: topic={topic}, source={source}")]
    PublishFailed {
        topic: String,
        #[source]
        source: BoxError,
    },
    #[error("decode failed: type={target}, source={source}")]
    DecodeFailed {
        target: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("broker error: {reason}")]
    Broker { reason: String },

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

/// 统一 Result 类型别名
pub type OutboxResult<T> = Result<T, OutboxError>;

impl OutboxError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }

    pub fn broker(reason: impl Into<String>) -> Self {
        Self::Broker {
            reason: reason.into(),
        }
    }

    pub fn write_failed(source: impl Into<BoxError>) -> Self {
        Self::WriteFailed {
            source: source.into(),
        }
    }

    pub fn publish_failed(topic: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::PublishFailed {
            topic: topic.into(),
            source: source.into(),
        }
    }

    pub fn decode_failed<T>(source: impl Into<BoxError>) -> Self {
        Self::DecodeFailed {
            target: std::any::type_name::<T>(),
            source: source.into(),
        }
    }
}

// ---- 基础设施错误转换 ----
// 允许在适配器中直接使用 `?` 将 sqlx/rdkafka 错误转换为 OutboxError

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for OutboxError {
    fn from(err: sqlx::Error) -> Self {
        OutboxError::Store {
            reason: err.to_string(),
        }
    }
}

#[cfg(feature = "infra-kafka")]
impl From<rdkafka::error::KafkaError> for OutboxError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        OutboxError::Broker {
            reason: err.to_string(),
        }
    }
}
