//! Postgres 版 Outbox 存储
//!
//! 写入走调用方持有的 `sqlx::Transaction`，轮询与状态回写走连接池。
//!
use crate::error::{OutboxError, OutboxResult};
use crate::outbox::{NewOutboxEvent, OutboxEvent, OutboxStore, OutboxTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;

/// Outbox 表结构
pub const OUTBOX_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS outbox (
    id              BIGSERIAL PRIMARY KEY,
    event_type      TEXT        NOT NULL,
    topic           TEXT        NOT NULL,
    event_payload   BYTEA       NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    times_attempted INTEGER     NOT NULL DEFAULT 0,
    published_at    TIMESTAMPTZ NULL
);

CREATE INDEX IF NOT EXISTS outbox_pending_idx
    ON outbox (created_at, id)
    WHERE published_at IS NULL;
"#;

const SELECT_COLUMNS: &str =
    "id, event_type, topic, event_payload, created_at, times_attempted, published_at";

/// Postgres Outbox 存储
#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 建表（幂等）
    pub async fn ensure_schema(&self) -> OutboxResult<()> {
        sqlx::raw_sql(OUTBOX_SCHEMA).execute(&self.pool).await?;
        info!("outbox schema ensured");
        Ok(())
    }

    /// 开启业务事务；业务写入与 `write_event` 共用该事务
    pub async fn begin(&self) -> OutboxResult<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }
}

#[async_trait]
impl<'c> OutboxTransaction for Transaction<'c, Postgres> {
    async fn insert_event(&mut self, event: NewOutboxEvent) -> OutboxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox (event_type, topic, event_payload, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event.event_type())
        .bind(event.topic())
        .bind(event.event_payload())
        .bind(event.created_at())
        .execute(&mut **self)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn fetch_pending(
        &self,
        limit: usize,
        max_attempts: Option<i32>,
    ) -> OutboxResult<Vec<OutboxEvent>> {
        let sql = format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM outbox
            WHERE published_at IS NULL
              AND ($2::INTEGER IS NULL OR times_attempted < $2)
            ORDER BY created_at, id
            LIMIT $1
            "#
        );

        let rows = sqlx::query_as::<_, OutboxEvent>(&sql)
            .bind(limit as i64)
            .bind(max_attempts)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_exhausted(
        &self,
        limit: usize,
        max_attempts: i32,
    ) -> OutboxResult<Vec<OutboxEvent>> {
        let sql = format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM outbox
            WHERE published_at IS NULL AND times_attempted >= $2
            ORDER BY created_at, id
            LIMIT $1
            "#
        );

        let rows = sqlx::query_as::<_, OutboxEvent>(&sql)
            .bind(limit as i64)
            .bind(max_attempts)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn record_failure(&self, event: &OutboxEvent) -> OutboxResult<()> {
        sqlx::query("UPDATE outbox SET times_attempted = $2 WHERE id = $1")
            .bind(event.id())
            .bind(event.times_attempted())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_published(&self, event: &OutboxEvent) -> OutboxResult<()> {
        if !event.is_published() {
            return Err(OutboxError::invalid_argument("published_at is not set"));
        }
        // published_at 一旦写入不再覆盖
        sqlx::query(
            r#"
            UPDATE outbox
            SET times_attempted = $2,
                published_at = COALESCE(published_at, $3)
            WHERE id = $1
            "#,
        )
        .bind(event.id())
        .bind(event.times_attempted())
        .bind(event.published_at())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn prune_published(&self, before: DateTime<Utc>) -> OutboxResult<u64> {
        let result =
            sqlx::query("DELETE FROM outbox WHERE published_at IS NOT NULL AND published_at < $1")
                .bind(before)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}
