use proc_macro::TokenStream;

mod integration_event;
mod utils;

/// 集成事件宏
///
/// 为结构体或枚举实现 `::outbox_bus::event::Event`，
/// 并合并派生 `Debug, Clone, serde::Serialize, serde::Deserialize`。
///
/// 结构体：
/// - `#[integration_event(topic = "customers", event_type = "customer.created", payload = customer)]`
/// - `event_type` 缺省为结构体名；`payload` 缺省为整个结构体
///
/// 枚举（事件族）：
/// - `#[integration_event(topic = "customers")]`
/// - 变体通过 `#[event(event_type = "...")]` 指定事件类型，缺省为 `Enum.Variant`
///
/// 同时生成关联常量 `TOPIC`，结构体额外生成 `EVENT_TYPE`。
#[proc_macro_attribute]
pub fn integration_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    integration_event::expand(attr, item)
}
