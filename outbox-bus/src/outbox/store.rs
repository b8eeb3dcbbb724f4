//! Outbox 存储契约
//!
//! 拆为两部分：
//! - `OutboxTransaction`：调用方持有的事务句柄，仅需支持插入一行；
//! - `OutboxStore`：事务外的轮询、状态回写与清理。
//!
use super::record::{NewOutboxEvent, OutboxEvent};
use crate::error::OutboxResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// 调用方事务：写入器只插入，从不提交或回滚
#[async_trait]
pub trait OutboxTransaction: Send {
    /// 事务是否仍可用（未提交/未回滚）
    fn is_open(&self) -> bool {
        true
    }

    async fn insert_event(&mut self, event: NewOutboxEvent) -> OutboxResult<()>;
}

/// Outbox 存储：供发布器在事务外读取与更新
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// 拉取待发布行（`published_at IS NULL`），按 `created_at, id` 升序；
    /// 设置 `max_attempts` 时跳过已达上限的行
    async fn fetch_pending(
        &self,
        limit: usize,
        max_attempts: Option<i32>,
    ) -> OutboxResult<Vec<OutboxEvent>>;

    /// 列出已达尝试上限仍未发布的行（死信视图）
    async fn fetch_exhausted(&self, limit: usize, max_attempts: i32)
    -> OutboxResult<Vec<OutboxEvent>>;

    /// 发布失败：仅持久化 `times_attempted`
    async fn record_failure(&self, event: &OutboxEvent) -> OutboxResult<()>;

    /// 发布成功：在一次更新中持久化 `times_attempted` 与 `published_at`
    async fn record_published(&self, event: &OutboxEvent) -> OutboxResult<()>;

    /// 删除早于 `before` 发布的行，返回删除条数
    async fn prune_published(&self, before: DateTime<Utc>) -> OutboxResult<u64>;
}

#[async_trait]
impl<S> OutboxStore for Arc<S>
where
    S: OutboxStore + ?Sized,
{
    async fn fetch_pending(
        &self,
        limit: usize,
        max_attempts: Option<i32>,
    ) -> OutboxResult<Vec<OutboxEvent>> {
        (**self).fetch_pending(limit, max_attempts).await
    }

    async fn fetch_exhausted(
        &self,
        limit: usize,
        max_attempts: i32,
    ) -> OutboxResult<Vec<OutboxEvent>> {
        (**self).fetch_exhausted(limit, max_attempts).await
    }

    async fn record_failure(&self, event: &OutboxEvent) -> OutboxResult<()> {
        (**self).record_failure(event).await
    }

    async fn record_published(&self, event: &OutboxEvent) -> OutboxResult<()> {
        (**self).record_published(event).await
    }

    async fn prune_published(&self, before: DateTime<Utc>) -> OutboxResult<u64> {
        (**self).prune_published(before).await
    }
}
