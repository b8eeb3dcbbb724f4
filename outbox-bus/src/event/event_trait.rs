use crate::error::OutboxResult;
use serde::Serialize;

/// 可发布事件需要满足的能力边界
///
/// 通常通过 `#[integration_event]` 宏实现；手写实现时只需给出类型、主题与载荷，
/// `to_json` 默认对整个事件做 JSON 序列化。
pub trait Event: Serialize + Send + Sync {
    /// 事件载荷类型
    type Payload: Serialize;

    /// 事件类型（形如 `customer.changed`），发布时作为消息 key
    fn event_type(&self) -> &str;

    /// 目标主题
    fn topic(&self) -> &str;

    /// 事件载荷
    fn payload(&self) -> &Self::Payload;

    /// 序列化为写入 Outbox / 发送至代理的字节
    fn to_json(&self) -> OutboxResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct CustomerChanged {
        id: String,
        name: String,
    }

    impl Event for CustomerChanged {
        type Payload = Self;

        fn event_type(&self) -> &str {
            "customer.changed"
        }

        fn topic(&self) -> &str {
            "customers"
        }

        fn payload(&self) -> &Self::Payload {
            self
        }
    }

    #[test]
    fn default_to_json_serializes_whole_event() {
        let ev = CustomerChanged {
            id: "42".into(),
            name: "alice".into(),
        };
        let bytes = ev.to_json().unwrap();
        let back: CustomerChanged = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, ev);
        assert_eq!(ev.event_type(), "customer.changed");
        assert_eq!(ev.topic(), "customers");
    }
}
