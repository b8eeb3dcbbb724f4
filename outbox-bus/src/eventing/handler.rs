//! 事件处理器（EventHandler）
//!
//! - `EventHandler<T>`：面向强类型事件 `T` 的业务处理器；
//! - `RawEventHandler`：总线可直接调度的字节级处理器；
//! - `TypedHandler`：把解码工厂与强类型处理器绑定为字节级处理器。
//!
use crate::error::OutboxError;
use crate::event::EventFactory;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// 强类型事件处理器
#[async_trait]
pub trait EventHandler<T>: Send + Sync
where
    T: Send + 'static,
{
    /// 处理器名称（用于日志）
    fn handler_name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, event: T) -> anyhow::Result<()>;
}

#[async_trait]
impl<T, H> EventHandler<T> for Arc<H>
where
    T: Send + 'static,
    H: EventHandler<T> + ?Sized,
{
    fn handler_name(&self) -> &str {
        (**self).handler_name()
    }

    async fn handle(&self, event: T) -> anyhow::Result<()> {
        (**self).handle(event).await
    }
}

/// 字节级处理器：总线按主题调度
#[async_trait]
pub trait RawEventHandler: Send + Sync {
    fn handler_name(&self) -> &str;

    async fn handle(&self, data: &[u8]) -> anyhow::Result<()>;
}

/// 类型化适配器：先解码再调用处理器
///
/// 解码失败返回 `OutboxError::DecodeFailed` 且不调用处理器；
/// 处理器的错误原样返回。适配器本身不做重试。
pub struct TypedHandler<T, F, H> {
    factory: F,
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F, H> TypedHandler<T, F, H>
where
    T: Send + 'static,
    F: EventFactory<T>,
    H: EventHandler<T>,
{
    pub fn new(factory: F, handler: H) -> Self {
        Self {
            factory,
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F, H> RawEventHandler for TypedHandler<T, F, H>
where
    T: Send + 'static,
    F: EventFactory<T>,
    H: EventHandler<T>,
{
    fn handler_name(&self) -> &str {
        self.handler.handler_name()
    }

    async fn handle(&self, data: &[u8]) -> anyhow::Result<()> {
        let event = self.factory.decode(data).map_err(|err| match err {
            OutboxError::DecodeFailed { .. } => err,
            other => OutboxError::decode_failed::<T>(other),
        })?;

        self.handler.handle(event).await
    }
}

/// 由异步闭包构造的处理器
pub struct HandlerFn<F> {
    name: String,
    f: F,
}

/// 以闭包构造处理器：`handler_fn("audit", |ev: CustomerChanged| async move { .. })`
pub fn handler_fn<F>(name: impl Into<String>, f: F) -> HandlerFn<F> {
    HandlerFn {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<T, F, Fut> EventHandler<T> for HandlerFn<F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    fn handler_name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: T) -> anyhow::Result<()> {
        (self.f)(event).await
    }
}
