//! Outbox 写入器
//!
//! 在调用方事务中追加一行事件：业务变更与事件行同生共死，
//! 提交/回滚始终由调用方负责。
//!
use super::record::NewOutboxEvent;
use super::store::OutboxTransaction;
use crate::error::{OutboxError, OutboxResult};
use crate::event::Event;
use tracing::{debug, instrument};

/// 无状态写入器，便于以依赖形式注入领域服务
#[derive(Debug, Clone, Copy, Default)]
pub struct OutboxWriter;

impl OutboxWriter {
    pub fn new() -> Self {
        Self
    }

    /// 在 `tx` 中写入一条事件
    ///
    /// - `tx` 已结束（提交/回滚）时返回 `InvalidArgument`；
    /// - 序列化失败时原样返回 `to_json` 的错误；
    /// - 插入失败时返回 `WriteFailed`。
    #[instrument(
        level = "debug",
        skip_all,
        fields(event_type = %event.event_type(), topic = %event.topic()),
        err
    )]
    pub async fn write_event<T, E>(&self, tx: &mut T, event: &E) -> OutboxResult<()>
    where
        T: OutboxTransaction + ?Sized,
        E: Event,
    {
        if !tx.is_open() {
            return Err(OutboxError::invalid_argument(
                "transaction is no longer open",
            ));
        }

        let payload = event.to_json()?;

        let row = NewOutboxEvent::builder()
            .event_type(event.event_type().to_string())
            .topic(event.topic().to_string())
            .event_payload(payload)
            .build();

        tx.insert_event(row)
            .await
            .map_err(OutboxError::write_failed)?;

        debug!("outbox event staged");
        Ok(())
    }
}

/// `OutboxWriter::write_event` 的函数形式
pub async fn write_event<T, E>(tx: &mut T, event: &E) -> OutboxResult<()>
where
    T: OutboxTransaction + ?Sized,
    E: Event,
{
    OutboxWriter.write_event(tx, event).await
}
