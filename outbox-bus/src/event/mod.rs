//! 集成事件（Integration Event）能力与解码工厂
//!
//! 定义可写入 Outbox、可在总线上发布的事件最小能力集（`Event`），
//! 以及将消息字节还原为强类型事件的工厂（`EventFactory`）。

mod event_trait;
mod factory;

pub use event_trait::Event;
pub use factory::{EventFactory, JsonEventFactory};
