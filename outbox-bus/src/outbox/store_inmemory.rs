//! 内存版 Outbox 存储（InMemoryOutboxStore）
//!
//! 以互斥锁保护的行集合模拟关系型存储：
//! - `begin`：开启事务，插入先暂存在事务内，`commit` 后才对轮询可见；
//! - `rollback` 或未提交即丢弃事务时，暂存的行全部作废；
//! - 典型用途：测试环境、示例与本地开发。
//!
use super::record::{NewOutboxEvent, OutboxEvent};
use super::store::{OutboxStore, OutboxTransaction};
use crate::error::{OutboxError, OutboxResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

#[derive(Default)]
struct Inner {
    rows: Vec<OutboxEvent>,
    next_id: i64,
}

/// 内存 Outbox 存储
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开启一个事务
    pub fn begin(&self) -> InMemoryTransaction {
        InMemoryTransaction {
            store: self.clone(),
            staged: Vec::new(),
            state: TxState::Open,
        }
    }

    /// 当前全部行的快照（按主键升序）
    pub fn rows(&self) -> Vec<OutboxEvent> {
        self.lock().rows.clone()
    }

    pub fn get(&self, id: i64) -> Option<OutboxEvent> {
        self.lock().rows.iter().find(|r| r.id() == id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().rows.iter().filter(|r| !r.is_published()).count()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, staged: Vec<NewOutboxEvent>) {
        let mut g = self.lock();
        for row in staged {
            g.next_id += 1;
            let id = g.next_id;
            g.rows.push(row.into_record(id));
        }
    }

    fn update<F>(&self, id: i64, f: F) -> OutboxResult<()>
    where
        F: FnOnce(&mut OutboxEvent),
    {
        let mut g = self.lock();
        let row = g
            .rows
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| OutboxError::store(format!("outbox row {id} not found")))?;
        f(row);
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn fetch_pending(
        &self,
        limit: usize,
        max_attempts: Option<i32>,
    ) -> OutboxResult<Vec<OutboxEvent>> {
        let g = self.lock();
        let mut rows: Vec<OutboxEvent> = g
            .rows
            .iter()
            .filter(|r| !r.is_published())
            .filter(|r| max_attempts.is_none_or(|max| r.times_attempted() < max))
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.created_at(), r.id()));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn fetch_exhausted(
        &self,
        limit: usize,
        max_attempts: i32,
    ) -> OutboxResult<Vec<OutboxEvent>> {
        let g = self.lock();
        let mut rows: Vec<OutboxEvent> = g
            .rows
            .iter()
            .filter(|r| !r.is_published() && r.times_attempted() >= max_attempts)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.created_at(), r.id()));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn record_failure(&self, event: &OutboxEvent) -> OutboxResult<()> {
        self.update(event.id(), |row| row.sync_attempts(event))
    }

    async fn record_published(&self, event: &OutboxEvent) -> OutboxResult<()> {
        if !event.is_published() {
            return Err(OutboxError::invalid_argument("published_at is not set"));
        }
        self.update(event.id(), |row| row.sync_published(event))
    }

    async fn prune_published(&self, before: DateTime<Utc>) -> OutboxResult<u64> {
        let mut g = self.lock();
        let len = g.rows.len();
        g.rows
            .retain(|r| r.published_at().is_none_or(|at| at >= before));
        Ok((len - g.rows.len()) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Open,
    Committed,
    RolledBack,
}

/// 内存事务句柄
pub struct InMemoryTransaction {
    store: InMemoryOutboxStore,
    staged: Vec<NewOutboxEvent>,
    state: TxState,
}

impl InMemoryTransaction {
    /// 提交：暂存行分配主键后写入存储
    pub fn commit(&mut self) -> OutboxResult<()> {
        self.ensure_open("commit")?;
        self.store.append(std::mem::take(&mut self.staged));
        self.state = TxState::Committed;
        Ok(())
    }

    /// 回滚：丢弃暂存行
    pub fn rollback(&mut self) -> OutboxResult<()> {
        self.ensure_open("rollback")?;
        self.staged.clear();
        self.state = TxState::RolledBack;
        Ok(())
    }

    /// 事务内已暂存、尚未提交的行数
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    fn ensure_open(&self, op: &str) -> OutboxResult<()> {
        match self.state {
            TxState::Open => Ok(()),
            TxState::Committed => Err(OutboxError::TransactionMisuse {
                reason: format!("{op} on a committed transaction"),
            }),
            TxState::RolledBack => Err(OutboxError::TransactionMisuse {
                reason: format!("{op} on a rolled back transaction"),
            }),
        }
    }
}

#[async_trait]
impl OutboxTransaction for InMemoryTransaction {
    fn is_open(&self) -> bool {
        self.state == TxState::Open
    }

    async fn insert_event(&mut self, event: NewOutboxEvent) -> OutboxResult<()> {
        self.ensure_open("insert")?;
        self.staged.push(event);
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.state == TxState::Open && !self.staged.is_empty() {
            warn!(
                staged = self.staged.len(),
                "transaction dropped without commit or rollback; staged outbox rows discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_row(ty: &str) -> NewOutboxEvent {
        NewOutboxEvent::builder()
            .event_type(ty.to_string())
            .topic("T".into())
            .event_payload(b"{}".to_vec())
            .build()
    }

    #[tokio::test]
    async fn rollback_discards_staged_rows() {
        let store = InMemoryOutboxStore::new();
        let mut tx = store.begin();
        tx.insert_event(new_row("a")).await.unwrap();
        assert_eq!(tx.staged_len(), 1);
        tx.rollback().unwrap();
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn dropping_open_transaction_discards_rows() {
        let store = InMemoryOutboxStore::new();
        {
            let mut tx = store.begin();
            tx.insert_event(new_row("a")).await.unwrap();
        }
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn finishing_twice_is_transaction_misuse() {
        let store = InMemoryOutboxStore::new();
        let mut tx = store.begin();
        tx.commit().unwrap();
        assert!(matches!(
            tx.commit(),
            Err(OutboxError::TransactionMisuse { .. })
        ));
        assert!(matches!(
            tx.insert_event(new_row("late")).await,
            Err(OutboxError::TransactionMisuse { .. })
        ));
    }

    #[tokio::test]
    async fn fetch_pending_orders_and_limits() {
        let store = InMemoryOutboxStore::new();
        let mut tx = store.begin();
        for ty in ["a", "b", "c"] {
            tx.insert_event(new_row(ty)).await.unwrap();
        }
        tx.commit().unwrap();

        let rows = store.fetch_pending(2, None).await.unwrap();
        let types: Vec<_> = rows.iter().map(|r| r.event_type().to_string()).collect();
        assert_eq!(types, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn max_attempts_parks_rows() {
        let store = InMemoryOutboxStore::new();
        let mut tx = store.begin();
        tx.insert_event(new_row("a")).await.unwrap();
        tx.commit().unwrap();

        let mut row = store.fetch_pending(10, Some(2)).await.unwrap().remove(0);
        row.record_attempt();
        store.record_failure(&row).await.unwrap();
        row.record_attempt();
        store.record_failure(&row).await.unwrap();

        assert!(store.fetch_pending(10, Some(2)).await.unwrap().is_empty());
        assert_eq!(store.fetch_pending(10, None).await.unwrap().len(), 1);
        assert_eq!(store.fetch_exhausted(10, 2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prune_removes_only_old_published_rows() {
        let store = InMemoryOutboxStore::new();
        let mut tx = store.begin();
        tx.insert_event(new_row("old")).await.unwrap();
        tx.insert_event(new_row("pending")).await.unwrap();
        tx.commit().unwrap();

        let mut old = store.get(1).unwrap();
        old.record_published(Utc::now() - chrono::Duration::hours(2));
        store.record_published(&old).await.unwrap();

        let removed = store
            .prune_published(Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.rows().len(), 1);
        assert_eq!(store.rows()[0].event_type(), "pending");
    }
}
