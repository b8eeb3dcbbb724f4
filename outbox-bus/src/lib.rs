//! 事务性 Outbox 与事件总线（outbox-bus）
//!
//! 让“业务状态变更”与“对外发布集成事件”保持一致：
//! - 在业务事务中写入 Outbox 行（`outbox::write_event`），与业务数据同生共死；
//! - 后台发布器（`outbox::OutboxPublisher`）轮询待发布行，经总线原样转发，
//!   失败的行在下个周期重试，保证至少一次投递；
//! - 事件总线（`eventing::EventBus`）按主题发布，按事件类型注册强类型处理器，
//!   每个主题一个消费循环，消息分发给该主题的全部处理器。
//!
//! 存储与消息代理均以 trait 抽象（`OutboxStore` / `Broker`），
//! 内置内存实现用于测试与示例，Postgres（`infra-sqlx`）与 Kafka（`infra-kafka`）
//! 适配器按 feature 启用。
//!
//! 典型用法：
//! 1. 以 `#[integration_event]` 定义事件，或手动实现 `event::Event`；
//! 2. 在业务事务中调用 `write_event` 并由调用方提交；
//! 3. 创建 `EventBus` 与 `OutboxPublisher`，调用 `start()`；
//! 4. 通过 `subscribe` 注册处理器，再以 `start_consuming` 运行消费循环。
//!
pub mod error;
pub mod event;
pub mod eventing;
#[cfg(any(feature = "infra-sqlx", feature = "infra-kafka"))]
pub mod infra;
pub mod outbox;

pub use error::{OutboxError, OutboxResult};
pub use event::{Event, EventFactory, JsonEventFactory};
pub use eventing::{BusConfig, EventBus, EventHandler};
pub use outbox::{OutboxPublisher, PublisherConfig, write_event};

// 允许在本 crate 内部通过 ::outbox_bus 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::outbox_bus 路径。
extern crate self as outbox_bus;
