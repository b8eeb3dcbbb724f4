use crate::error::{OutboxError, OutboxResult};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;

/// 事件工厂：把消息字节解码为具体事件 `T`
pub trait EventFactory<T>: Send + Sync {
    fn decode(&self, data: &[u8]) -> OutboxResult<T>;
}

impl<T, F> EventFactory<T> for F
where
    F: Fn(&[u8]) -> OutboxResult<T> + Send + Sync,
{
    fn decode(&self, data: &[u8]) -> OutboxResult<T> {
        (self)(data)
    }
}

/// 基于 serde_json 的默认工厂
pub struct JsonEventFactory<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonEventFactory<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonEventFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonEventFactory<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonEventFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonEventFactory")
            .field("target", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> EventFactory<T> for JsonEventFactory<T>
where
    T: DeserializeOwned,
{
    fn decode(&self, data: &[u8]) -> OutboxResult<T> {
        serde_json::from_slice(data).map_err(OutboxError::decode_failed::<T>)
    }
}
