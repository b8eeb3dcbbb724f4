//! Outbox 行模型
//!
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 持久化的 Outbox 行
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[cfg_attr(feature = "infra-sqlx", derive(sqlx::FromRow))]
pub struct OutboxEvent {
    /// 代理主键，由存储在插入时分配
    id: i64,
    /// 事件类型，写入时取自 `Event::event_type`
    event_type: String,
    /// 目标主题，写入时取自 `Event::topic`
    topic: String,
    /// `Event::to_json` 的原始输出，对 Outbox 不透明
    event_payload: Vec<u8>,
    /// 插入时间
    created_at: DateTime<Utc>,
    /// 发布尝试次数（成功或失败都 +1）
    #[builder(default)]
    times_attempted: i32,
    /// 发布时间；为空表示仍待发布，一旦设置不再清除
    published_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn event_payload(&self) -> &[u8] {
        &self.event_payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn times_attempted(&self) -> i32 {
        self.times_attempted
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    /// 记录一次失败的发布尝试
    pub(crate) fn record_attempt(&mut self) {
        self.times_attempted += 1;
    }

    /// 记录一次成功的发布尝试
    pub(crate) fn record_published(&mut self, at: DateTime<Utc>) {
        self.times_attempted += 1;
        if self.published_at.is_none() {
            self.published_at = Some(at);
        }
    }

    /// 存储侧：仅同步尝试次数
    pub(crate) fn sync_attempts(&mut self, from: &OutboxEvent) {
        self.times_attempted = from.times_attempted;
    }

    /// 存储侧：同步尝试次数与发布时间（已发布的行保持原发布时间）
    pub(crate) fn sync_published(&mut self, from: &OutboxEvent) {
        self.times_attempted = from.times_attempted;
        if self.published_at.is_none() {
            self.published_at = from.published_at;
        }
    }
}

/// 插入形态：`id/times_attempted/published_at` 由存储侧取默认值
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct NewOutboxEvent {
    event_type: String,
    topic: String,
    event_payload: Vec<u8>,
    #[builder(default = Utc::now())]
    created_at: DateTime<Utc>,
}

impl NewOutboxEvent {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn event_payload(&self) -> &[u8] {
        &self.event_payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 由存储分配主键后得到完整行
    pub fn into_record(self, id: i64) -> OutboxEvent {
        OutboxEvent {
            id,
            event_type: self.event_type,
            topic: self.topic,
            event_payload: self.event_payload,
            created_at: self.created_at,
            times_attempted: 0,
            published_at: None,
        }
    }
}
