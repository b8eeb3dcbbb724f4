//! Kafka 版消息代理
//!
//! 生产者为 `FutureProducer`，每个主题一个 `StreamConsumer`。
//! `CommitPolicy::OnRead` 对应 librdkafka 自动提交，
//! `AfterDispatch` 关闭自动提交，由总线在处理完成后显式提交位点。
//!
use crate::error::{OutboxError, OutboxResult};
use crate::eventing::{Broker, BrokerMessage, CommitPolicy, MessageConsumer, MessageProducer};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Kafka 连接配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// `bootstrap.servers`
    pub brokers: String,
    pub client_id: String,
    /// 生产者等待投递确认的时长（毫秒）
    pub produce_timeout_ms: u64,
    /// 原样透传给 librdkafka 的额外属性
    pub properties: HashMap<String, String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            client_id: "outbox-bus".to_string(),
            produce_timeout_ms: 5_000,
            properties: HashMap::new(),
        }
    }
}

impl KafkaConfig {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.client_id);
        for (key, value) in &self.properties {
            config.set(key, value);
        }
        config
    }
}

/// Kafka 消息代理
#[derive(Debug, Clone)]
pub struct KafkaBroker {
    config: KafkaConfig,
}

impl KafkaBroker {
    pub fn new(config: KafkaConfig) -> OutboxResult<Self> {
        if config.brokers.trim().is_empty() {
            return Err(OutboxError::invalid_argument("kafka brokers must not be empty"));
        }
        Ok(Self { config })
    }
}

impl Broker for KafkaBroker {
    fn producer(&self) -> OutboxResult<Arc<dyn MessageProducer>> {
        let producer: FutureProducer = self
            .config
            .client_config()
            .set("message.timeout.ms", self.config.produce_timeout_ms.to_string())
            .create()?;

        info!(brokers = %self.config.brokers, "kafka producer created");
        Ok(Arc::new(KafkaProducer {
            producer,
            timeout: Duration::from_millis(self.config.produce_timeout_ms),
        }))
    }

    fn consumer(
        &self,
        topic: &str,
        group_id: &str,
        commit: CommitPolicy,
    ) -> OutboxResult<Arc<dyn MessageConsumer>> {
        let auto_commit = commit == CommitPolicy::OnRead;
        let consumer: StreamConsumer = self
            .config
            .client_config()
            .set("group.id", group_id)
            .set("enable.auto.commit", auto_commit.to_string())
            .set("auto.offset.reset", "earliest")
            .create()?;
        consumer.subscribe(&[topic])?;

        info!(topic, group_id, auto_commit, "kafka consumer subscribed");
        Ok(Arc::new(KafkaConsumer {
            consumer,
            topic: topic.to_string(),
            group_id: group_id.to_string(),
            auto_commit,
        }))
    }
}

struct KafkaProducer {
    producer: FutureProducer,
    timeout: Duration,
}

#[async_trait]
impl MessageProducer for KafkaProducer {
    async fn write(&self, topic: &str, key: &str, value: &[u8]) -> OutboxResult<()> {
        let record = FutureRecord::to(topic).key(key).payload(value);
        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(err, _message)| OutboxError::from(err))?;

        debug!(topic, partition, offset, "kafka message delivered");
        Ok(())
    }
}

struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: String,
    group_id: String,
    auto_commit: bool,
}

#[async_trait]
impl MessageConsumer for KafkaConsumer {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn group_id(&self) -> &str {
        &self.group_id
    }

    async fn read(&self) -> OutboxResult<BrokerMessage> {
        let message = self.consumer.recv().await?;

        let key = message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default();
        let value = message.payload().map(<[u8]>::to_vec).unwrap_or_default();

        Ok(BrokerMessage::new(
            message.topic(),
            key,
            value,
            message.partition(),
            message.offset(),
        ))
    }

    async fn commit(&self, message: &BrokerMessage) -> OutboxResult<()> {
        if self.auto_commit {
            return Ok(());
        }

        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(
            message.topic(),
            message.partition(),
            Offset::Offset(message.offset() + 1),
        )?;
        self.consumer.commit(&offsets, CommitMode::Async)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_brokers_are_rejected() {
        let config = KafkaConfig {
            brokers: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            KafkaBroker::new(config),
            Err(OutboxError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn extra_properties_are_passed_through() {
        let mut config = KafkaConfig::default();
        config
            .properties
            .insert("security.protocol".into(), "SASL_SSL".into());

        let client = config.client_config();
        assert_eq!(client.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(client.get("security.protocol"), Some("SASL_SSL"));
    }
}
