//! 基础设施适配器
//!
//! - `postgres`：基于 sqlx 的 Outbox 存储（feature `infra-sqlx`）；
//! - `kafka`：基于 rdkafka 的消息代理（feature `infra-kafka`）。
//!
#[cfg(feature = "infra-kafka")]
pub mod kafka;
#[cfg(feature = "infra-sqlx")]
pub mod postgres;

#[cfg(feature = "infra-kafka")]
pub use kafka::{KafkaBroker, KafkaConfig};
#[cfg(feature = "infra-sqlx")]
pub use postgres::{OUTBOX_SCHEMA, PgOutboxStore};
