//! 消息代理（Broker）契约
//!
//! 事件总线只依赖三项能力：生产者按主题写入 `(key, value)`，
//! 消费者按主题/消费组阻塞读取，以及可选的位点提交。
//!
use crate::error::OutboxResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 从代理读到的一条消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    topic: String,
    key: String,
    value: Vec<u8>,
    partition: i32,
    offset: i64,
}

impl BrokerMessage {
    pub fn new(
        topic: impl Into<String>,
        key: impl Into<String>,
        value: Vec<u8>,
        partition: i32,
        offset: i64,
    ) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            value,
            partition,
            offset,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// 消息 key，约定为事件类型
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }
}

/// 消费位点提交策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// 读取即提交（等价于自动提交）：读后崩溃可能丢失业务处理
    #[default]
    OnRead,
    /// 处理器执行完毕后再提交：崩溃后从上次提交位点重读
    AfterDispatch,
}

/// 生产者
#[async_trait]
pub trait MessageProducer: Send + Sync {
    async fn write(&self, topic: &str, key: &str, value: &[u8]) -> OutboxResult<()>;
}

/// 消费者：绑定单一主题与消费组
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    fn topic(&self) -> &str;

    fn group_id(&self) -> &str;

    /// 阻塞读取下一条消息；返回的 future 可在任意 await 点被丢弃
    async fn read(&self) -> OutboxResult<BrokerMessage>;

    /// 提交该消息之后的位点
    async fn commit(&self, _message: &BrokerMessage) -> OutboxResult<()> {
        Ok(())
    }
}

/// 代理客户端：提供生产者与按主题创建的消费者
pub trait Broker: Send + Sync {
    fn producer(&self) -> OutboxResult<Arc<dyn MessageProducer>>;

    fn consumer(
        &self,
        topic: &str,
        group_id: &str,
        commit: CommitPolicy,
    ) -> OutboxResult<Arc<dyn MessageConsumer>>;
}
