//! Outbox 发布器（OutboxPublisher）
//!
//! 单个后台任务按固定间隔轮询待发布行，逐行经 `RawPublisher` 原样转发：
//! - 成功：尝试次数 +1 并写入 `published_at`；
//! - 失败：仅尝试次数 +1，下个周期重试；
//! - 取消：当前周期立即停止，剩余行保持不变。
//!
use super::record::OutboxEvent;
use super::store::OutboxStore;
use crate::error::{OutboxError, OutboxResult};
use crate::eventing::RawPublisher;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// 发布器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// 轮询间隔（配置文件中以毫秒表示）
    #[serde(rename = "process_interval_ms", with = "duration_millis")]
    pub process_interval: Duration,
    /// 每个周期最多取出的行数
    pub batch_size: usize,
    /// 尝试次数上限；达到后该行不再被轮询。`None` 表示无限重试
    pub max_attempts: Option<i32>,
    /// 已发布行的保留时长；`None` 表示从不删除
    #[serde(rename = "retention_ms", with = "option_duration_millis")]
    pub retention: Option<Duration>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            process_interval: Duration::from_secs(5),
            batch_size: 100,
            max_attempts: None,
            retention: None,
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> OutboxResult<()> {
        if self.process_interval.is_zero() {
            return Err(OutboxError::invalid_argument(
                "process_interval must be greater than zero",
            ));
        }
        if self.batch_size == 0 {
            return Err(OutboxError::invalid_argument(
                "batch_size must be greater than zero",
            ));
        }
        if let Some(max) = self.max_attempts
            && max <= 0
        {
            return Err(OutboxError::invalid_argument(
                "max_attempts must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// 单个轮询周期的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub published: usize,
    pub failed: usize,
    /// 因取消而未处理的行
    pub skipped: usize,
}

struct Relay {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn RawPublisher>,
    config: PublisherConfig,
}

struct RunHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Outbox 发布器
pub struct OutboxPublisher {
    relay: Arc<Relay>,
    running: Mutex<Option<RunHandle>>,
}

impl OutboxPublisher {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        publisher: Arc<dyn RawPublisher>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            relay: Arc::new(Relay {
                store,
                publisher,
                config,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.relay.config
    }

    /// 启动后台轮询；已在运行时返回 `InvalidState`
    pub fn start(&self) -> OutboxResult<()> {
        self.relay.config.validate()?;

        let mut running = self.lock();
        if running.as_ref().is_some_and(|h| !h.task.is_finished()) {
            return Err(OutboxError::invalid_state("outbox publisher already running"));
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(self.relay.clone().run(token.clone()));
        *running = Some(RunHandle { token, task });

        info!(
            interval_ms = self.relay.config.process_interval.as_millis() as u64,
            batch_size = self.relay.config.batch_size,
            "outbox publisher started"
        );
        Ok(())
    }

    /// 取消后台轮询并等待其退出；未运行时直接返回
    pub async fn stop(&self) -> OutboxResult<()> {
        let Some(handle) = self.lock().take() else {
            return Ok(());
        };

        handle.token.cancel();
        handle.task.await.map_err(|err| {
            OutboxError::invalid_state(format!("outbox publisher loop aborted: {err}"))
        })?;

        info!("outbox publisher stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    /// 执行一个轮询周期
    pub async fn process_outbox(&self, token: &CancellationToken) -> OutboxResult<CycleReport> {
        self.relay.process_outbox(token).await
    }

    fn lock(&self) -> MutexGuard<'_, Option<RunHandle>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for OutboxPublisher {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = running.take() {
            handle.token.cancel();
        }
    }
}

impl Relay {
    async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = time::interval(self.config.process_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    match self.process_outbox(&token).await {
                        Ok(report) if report.fetched > 0 => debug!(?report, "outbox cycle finished"),
                        Ok(_) => {}
                        Err(err) => error!(error = %err, "outbox cycle failed"),
                    }
                }
            }
        }
    }

    #[instrument(level = "debug", skip_all, err)]
    async fn process_outbox(&self, token: &CancellationToken) -> OutboxResult<CycleReport> {
        let rows = self
            .store
            .fetch_pending(self.config.batch_size, self.config.max_attempts)
            .await?;

        let mut report = CycleReport {
            fetched: rows.len(),
            ..Default::default()
        };

        for (index, row) in rows.into_iter().enumerate() {
            if token.is_cancelled() {
                report.skipped = report.fetched - index;
                info!(skipped = report.skipped, "outbox cycle cancelled");
                return Ok(report);
            }

            if self.relay_row(row).await {
                report.published += 1;
            } else {
                report.failed += 1;
            }
        }

        if let Some(retention) = self.config.retention {
            self.prune(retention).await;
        }

        Ok(report)
    }

    async fn relay_row(&self, mut row: OutboxEvent) -> bool {
        let published = self
            .publisher
            .publish_raw(row.topic(), row.event_type(), row.event_payload())
            .await;

        match published {
            Ok(()) => {
                row.record_published(Utc::now());
                if let Err(err) = self.store.record_published(&row).await {
                    error!(outbox_id = row.id(), error = %err, "failed to mark outbox event published");
                }
                debug!(
                    outbox_id = row.id(),
                    topic = row.topic(),
                    event_type = row.event_type(),
                    "outbox event published"
                );
                true
            }
            Err(err) => {
                row.record_attempt();
                warn!(
                    outbox_id = row.id(),
                    topic = row.topic(),
                    times_attempted = row.times_attempted(),
                    error = %err,
                    "outbox event publish failed"
                );
                if let Some(max) = self.config.max_attempts
                    && row.times_attempted() == max
                {
                    warn!(
                        outbox_id = row.id(),
                        max_attempts = max,
                        "outbox event reached max attempts; no further retries"
                    );
                }
                if let Err(err) = self.store.record_failure(&row).await {
                    error!(outbox_id = row.id(), error = %err, "failed to record outbox attempt");
                }
                false
            }
        }
    }

    async fn prune(&self, retention: Duration) {
        let before = match chrono::Duration::from_std(retention) {
            Ok(retention) => Utc::now() - retention,
            Err(err) => {
                warn!(error = %err, "retention out of range; pruning skipped");
                return;
            }
        };

        match self.store.prune_published(before).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "pruned published outbox events"),
            Err(err) => warn!(error = %err, "outbox pruning failed"),
        }
    }
}

// Duration 以毫秒整数序列化
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
