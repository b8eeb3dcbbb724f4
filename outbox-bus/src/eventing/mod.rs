//! 事件子系统（eventing）
//!
//! 发布/订阅与处理的运行时：
//! - `Broker`：生产者/消费者契约，可对接 Kafka 或内存实现；
//! - `EventBus`：按主题发布，按事件类型注册处理器并运行消费循环；
//! - `EventHandler`：对解码后的事件进行业务处理。
//!
pub mod broker;
pub mod broker_inmemory;
pub mod bus;
pub mod handler;

pub use broker::{Broker, BrokerMessage, CommitPolicy, MessageConsumer, MessageProducer};
pub use broker_inmemory::InMemoryBroker;
pub use bus::{BusConfig, DEFAULT_GROUP_ID, DispatchMode, EventBus, RawPublisher};
pub use handler::{EventHandler, HandlerFn, RawEventHandler, TypedHandler, handler_fn};
