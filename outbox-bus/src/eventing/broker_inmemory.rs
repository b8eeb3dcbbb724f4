//! 内存版消息代理（InMemoryBroker）
//!
//! 每个主题一条只追加的消息日志，按消费组记录读取位置与已提交位点：
//! - `write`：追加消息并唤醒阻塞中的读者；
//! - `read`：从消费组当前位置读取，日志读尽时挂起等待；
//! - 新建同组消费者时从已提交位点重新开始，模拟消费者重启/再均衡；
//! - 支持注入写/读失败，用于测试重试与错误传播。
//!
//! 注意：该实现只有单一分区，同组多个消费者会共享读取位置。

use super::broker::{Broker, BrokerMessage, CommitPolicy, MessageConsumer, MessageProducer};
use crate::error::{OutboxError, OutboxResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Default)]
struct TopicLog {
    messages: Vec<BrokerMessage>,
    positions: HashMap<String, i64>,
    committed: HashMap<String, i64>,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, TopicLog>,
    fail_writes: usize,
    fail_reads: HashMap<String, usize>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 内存消息代理
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让接下来的 `n` 次写入失败
    pub fn fail_next_writes(&self, n: usize) {
        self.shared.lock().fail_writes = n;
    }

    /// 让 `topic` 上接下来的 `n` 次读取失败
    pub fn fail_next_reads(&self, topic: &str, n: usize) {
        self.shared.lock().fail_reads.insert(topic.to_string(), n);
        self.shared.notify.notify_waiters();
    }

    /// 主题日志快照
    pub fn messages(&self, topic: &str) -> Vec<BrokerMessage> {
        self.shared
            .lock()
            .topics
            .get(topic)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// 消费组在主题上的已提交位点（下一条待读消息的 offset）
    pub fn committed_offset(&self, topic: &str, group_id: &str) -> Option<i64> {
        self.shared
            .lock()
            .topics
            .get(topic)
            .and_then(|log| log.committed.get(group_id).copied())
    }
}

impl Broker for InMemoryBroker {
    fn producer(&self) -> OutboxResult<Arc<dyn MessageProducer>> {
        Ok(Arc::new(InMemoryProducer {
            shared: self.shared.clone(),
        }))
    }

    fn consumer(
        &self,
        topic: &str,
        group_id: &str,
        commit: CommitPolicy,
    ) -> OutboxResult<Arc<dyn MessageConsumer>> {
        {
            let mut state = self.shared.lock();
            let log = state.topics.entry(topic.to_string()).or_default();
            let committed = log.committed.get(group_id).copied().unwrap_or(0);
            log.positions.insert(group_id.to_string(), committed);
        }

        Ok(Arc::new(InMemoryConsumer {
            shared: self.shared.clone(),
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            auto_commit: commit == CommitPolicy::OnRead,
        }))
    }
}

struct InMemoryProducer {
    shared: Arc<Shared>,
}

#[async_trait]
impl MessageProducer for InMemoryProducer {
    async fn write(&self, topic: &str, key: &str, value: &[u8]) -> OutboxResult<()> {
        {
            let mut state = self.shared.lock();
            if state.fail_writes > 0 {
                state.fail_writes -= 1;
                return Err(OutboxError::broker("injected write failure"));
            }
            let log = state.topics.entry(topic.to_string()).or_default();
            let offset = log.messages.len() as i64;
            log.messages
                .push(BrokerMessage::new(topic, key, value.to_vec(), 0, offset));
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

struct InMemoryConsumer {
    shared: Arc<Shared>,
    topic: String,
    group_id: String,
    auto_commit: bool,
}

impl InMemoryConsumer {
    fn try_next(&self) -> OutboxResult<Option<BrokerMessage>> {
        let mut state = self.shared.lock();

        if let Some(remaining) = state.fail_reads.get_mut(&self.topic)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(OutboxError::broker(format!(
                "injected read failure on topic {}",
                self.topic
            )));
        }

        let log = state.topics.entry(self.topic.clone()).or_default();
        let committed = log.committed.get(&self.group_id).copied().unwrap_or(0);
        let position = *log
            .positions
            .entry(self.group_id.clone())
            .or_insert(committed);

        let Some(message) = log.messages.get(position as usize).cloned() else {
            return Ok(None);
        };

        log.positions.insert(self.group_id.clone(), position + 1);
        if self.auto_commit {
            log.committed.insert(self.group_id.clone(), position + 1);
        }
        Ok(Some(message))
    }
}

#[async_trait]
impl MessageConsumer for InMemoryConsumer {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn group_id(&self) -> &str {
        &self.group_id
    }

    async fn read(&self) -> OutboxResult<BrokerMessage> {
        loop {
            // 先登记唤醒再检查日志，避免检查与等待之间的写入被错过
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_next()? {
                return Ok(message);
            }

            notified.await;
        }
    }

    async fn commit(&self, message: &BrokerMessage) -> OutboxResult<()> {
        let mut state = self.shared.lock();
        let log = state.topics.entry(self.topic.clone()).or_default();
        let next = message.offset() + 1;
        let committed = log.committed.entry(self.group_id.clone()).or_insert(0);
        if next > *committed {
            *committed = next;
        }
        Ok(())
    }
}
