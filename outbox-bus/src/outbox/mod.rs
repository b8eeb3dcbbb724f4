//! 事务性 Outbox
//!
//! - `OutboxEvent`：待发布/已发布事件的持久化行；
//! - `OutboxTransaction` / `OutboxStore`：存储契约（事务内插入、事务外轮询与更新）；
//! - `OutboxWriter`：在调用方事务中追加事件，不提交也不回滚；
//! - `OutboxPublisher`：后台轮询待发布行，经总线原样转发并回写状态；
//! - `InMemoryOutboxStore`：带事务语义的内存实现，用于测试与示例。
//!
mod publisher;
mod record;
mod store;
mod store_inmemory;
mod writer;

pub use publisher::{CycleReport, OutboxPublisher, PublisherConfig};
pub use record::{NewOutboxEvent, OutboxEvent};
pub use store::{OutboxStore, OutboxTransaction};
pub use store_inmemory::{InMemoryOutboxStore, InMemoryTransaction};
pub use writer::{OutboxWriter, write_event};
