//! 事件总线（EventBus）
//!
//! 持有一个生产者与“主题 → 消费者/处理器列表”注册表：
//! - `publish` / `publish_raw`：序列化发布与原样字节发布；
//! - `subscribe_typed`：按事件类型的主题惰性创建消费者并追加处理器；
//! - `start_consuming`：每个主题一个消费循环，读取后分发给该主题全部处理器。
//!
use super::broker::{Broker, BrokerMessage, CommitPolicy, MessageConsumer, MessageProducer};
use super::handler::{EventHandler, RawEventHandler, TypedHandler};
use crate::error::{OutboxError, OutboxResult};
use crate::event::{Event, EventFactory, JsonEventFactory};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// 默认消费组
pub const DEFAULT_GROUP_ID: &str = "outbox-bus";

/// 单条消息在多个处理器间的调度方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// 每个处理器独立 spawn，不等待完成即读取下一条；失败仅记录日志
    #[default]
    Detached,
    /// 同一消息的处理器并发执行，全部完成后再读取下一条
    Awaited,
}

/// 事件总线配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// 消费组 ID
    pub group_id: String,
    /// 处理器调度方式
    pub dispatch: DispatchMode,
    /// 位点提交策略
    pub commit: CommitPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            group_id: DEFAULT_GROUP_ID.to_string(),
            dispatch: DispatchMode::default(),
            commit: CommitPolicy::default(),
        }
    }
}

impl BusConfig {
    pub fn validate(&self) -> OutboxResult<()> {
        if self.group_id.trim().is_empty() {
            return Err(OutboxError::invalid_argument("group_id must not be empty"));
        }
        // 不等待处理器时无法“处理后提交”
        if self.dispatch == DispatchMode::Detached && self.commit == CommitPolicy::AfterDispatch {
            return Err(OutboxError::invalid_argument(
                "commit = after_dispatch requires dispatch = awaited",
            ));
        }
        Ok(())
    }
}

/// 原样字节发布能力：Outbox 发布器只依赖这一条路径
#[async_trait]
pub trait RawPublisher: Send + Sync {
    async fn publish_raw(&self, topic: &str, event_type: &str, data: &[u8]) -> OutboxResult<()>;
}

struct TopicSubscription {
    consumer: Arc<dyn MessageConsumer>,
    handlers: Vec<Arc<dyn RawEventHandler>>,
}

/// 事件总线
pub struct EventBus {
    broker: Arc<dyn Broker>,
    producer: Arc<dyn MessageProducer>,
    registry: RwLock<HashMap<String, TopicSubscription>>,
    config: BusConfig,
}

impl EventBus {
    /// 创建总线并取得唯一的生产者
    pub fn new(broker: Arc<dyn Broker>, config: BusConfig) -> OutboxResult<Self> {
        config.validate()?;
        let producer = broker.producer()?;

        Ok(Self {
            broker,
            producer,
            registry: RwLock::new(HashMap::new()),
            config,
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// 序列化整个事件并发布，消息 key 为事件类型
    #[instrument(skip(self, event), fields(event_type = %event.event_type()), err)]
    pub async fn publish<E>(&self, topic: &str, event: &E) -> OutboxResult<()>
    where
        E: Event,
    {
        let data = event
            .to_json()
            .map_err(|err| OutboxError::publish_failed(topic, err))?;

        self.producer
            .write(topic, event.event_type(), &data)
            .await
            .map_err(|err| OutboxError::publish_failed(topic, err))
    }

    /// 原样发布 `data`，不做任何重编码
    #[instrument(skip(self, data), fields(bytes = data.len()), err)]
    pub async fn publish_raw(&self, topic: &str, event_type: &str, data: &[u8]) -> OutboxResult<()> {
        self.producer
            .write(topic, event_type, data)
            .await
            .map_err(|err| OutboxError::publish_failed(topic, err))
    }

    /// 注册强类型处理器，返回事件类型对应的主题
    ///
    /// 主题取自 `T::default().topic()`；同一主题只创建一个消费者，
    /// 重复注册会追加处理器，每条消息都会调度到全部处理器。
    pub async fn subscribe_typed<T, F, H>(&self, factory: F, handler: H) -> OutboxResult<String>
    where
        T: Event + Default + Send + 'static,
        F: EventFactory<T> + 'static,
        H: EventHandler<T> + 'static,
    {
        let topic = T::default().topic().to_string();
        self.subscribe_raw(&topic, Arc::new(TypedHandler::new(factory, handler)))
            .await?;
        Ok(topic)
    }

    /// 以 JSON 工厂注册强类型处理器
    pub async fn subscribe<T, H>(&self, handler: H) -> OutboxResult<String>
    where
        T: Event + DeserializeOwned + Default + Send + 'static,
        H: EventHandler<T> + 'static,
    {
        self.subscribe_typed(JsonEventFactory::<T>::new(), handler)
            .await
    }

    /// 注册字节级处理器
    pub async fn subscribe_raw(
        &self,
        topic: &str,
        handler: Arc<dyn RawEventHandler>,
    ) -> OutboxResult<()> {
        if topic.trim().is_empty() {
            return Err(OutboxError::invalid_argument("topic must not be empty"));
        }

        let mut registry = self.registry.write().await;
        let subscription = match registry.entry(topic.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let consumer =
                    self.broker
                        .consumer(topic, &self.config.group_id, self.config.commit)?;
                info!(topic, group_id = %self.config.group_id, "consumer created");
                entry.insert(TopicSubscription {
                    consumer,
                    handlers: Vec::new(),
                })
            }
        };

        debug!(topic, handler = handler.handler_name(), "handler registered");
        subscription.handlers.push(handler);
        Ok(())
    }

    /// 已注册的主题
    pub async fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.registry.read().await.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// 主题上的处理器数量
    pub async fn handler_count(&self, topic: &str) -> usize {
        self.registry
            .read()
            .await
            .get(topic)
            .map(|s| s.handlers.len())
            .unwrap_or(0)
    }

    /// 为每个已注册主题启动消费循环
    ///
    /// 任一循环读取出错时返回该错误，`token` 取消时返回 `Ok(())`。
    /// 返回前会取消其余循环，但不等待它们退出。
    pub async fn start_consuming(self: Arc<Self>, token: CancellationToken) -> OutboxResult<()> {
        let consumers: Vec<(String, Arc<dyn MessageConsumer>)> = self
            .registry
            .read()
            .await
            .iter()
            .map(|(topic, s)| (topic.clone(), s.consumer.clone()))
            .collect();

        if consumers.is_empty() {
            info!("no topics subscribed; waiting for cancellation");
            token.cancelled().await;
            return Ok(());
        }

        let loops = token.child_token();
        let (tx, mut rx) = mpsc::channel::<OutboxResult<()>>(consumers.len());

        for (topic, consumer) in consumers {
            let bus = self.clone();
            let token = loops.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = bus.consume_topic(topic, consumer, token).await;
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        let result = tokio::select! {
            _ = token.cancelled() => Ok(()),
            first = rx.recv() => first.unwrap_or(Ok(())),
        };

        loops.cancel();
        result
    }

    async fn consume_topic(
        &self,
        topic: String,
        consumer: Arc<dyn MessageConsumer>,
        token: CancellationToken,
    ) -> OutboxResult<()> {
        info!(topic = %topic, group_id = consumer.group_id(), "consumer loop started");

        loop {
            // 取消优先于读取，取消后不再消费新消息
            let message = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(topic = %topic, "consumer loop stopped");
                    return Ok(());
                }
                read = consumer.read() => match read {
                    Ok(message) => message,
                    Err(err) => {
                        error!(topic = %topic, error = %err, "consumer read failed");
                        return Err(err);
                    }
                },
            };

            self.dispatch(&topic, consumer.as_ref(), message).await;
        }
    }

    async fn dispatch(&self, topic: &str, consumer: &dyn MessageConsumer, message: BrokerMessage) {
        let handlers: Vec<Arc<dyn RawEventHandler>> = self
            .registry
            .read()
            .await
            .get(topic)
            .map(|s| s.handlers.clone())
            .unwrap_or_default();

        if handlers.is_empty() {
            warn!(
                topic,
                key = message.key(),
                offset = message.offset(),
                "no handlers registered; message dropped"
            );
        } else {
            let data: Arc<[u8]> = Arc::from(message.value());

            match self.config.dispatch {
                DispatchMode::Detached => {
                    for handler in handlers {
                        let data = data.clone();
                        let topic = topic.to_string();
                        tokio::spawn(async move {
                            run_handler(&topic, handler.as_ref(), &data).await;
                        });
                    }
                }
                DispatchMode::Awaited => {
                    join_all(
                        handlers
                            .iter()
                            .map(|handler| run_handler(topic, handler.as_ref(), &data)),
                    )
                    .await;
                }
            }
        }

        if self.config.commit == CommitPolicy::AfterDispatch
            && let Err(err) = consumer.commit(&message).await
        {
            warn!(topic, offset = message.offset(), error = %err, "offset commit failed");
        }
    }
}

async fn run_handler(topic: &str, handler: &dyn RawEventHandler, data: &[u8]) {
    if let Err(err) = handler.handle(data).await {
        error!(
            topic,
            handler = handler.handler_name(),
            error = %err,
            "event handler failed"
        );
    }
}

#[async_trait]
impl RawPublisher for EventBus {
    async fn publish_raw(&self, topic: &str, event_type: &str, data: &[u8]) -> OutboxResult<()> {
        EventBus::publish_raw(self, topic, event_type, data).await
    }
}
