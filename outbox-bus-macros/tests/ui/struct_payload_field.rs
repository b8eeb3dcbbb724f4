use outbox_bus::event::Event;
use outbox_bus_macros::integration_event;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Customer {
    id: String,
    email: String,
}

// 与已有 derive 合并，不会重复派生
#[integration_event(topic = "customers", event_type = "customer.changed", payload = customer)]
#[derive(Debug, Serialize)]
struct CustomerChanged {
    customer: Customer,
    changed_by: String,
}

fn main() {
    let ev = CustomerChanged {
        customer: Customer {
            id: "c-1".into(),
            email: "ada@example.com".into(),
        },
        changed_by: "admin".into(),
    };
    let payload: &Customer = ev.payload();
    assert_eq!(payload.email, "ada@example.com");

    // to_json 序列化整个事件而非 payload
    let json: serde_json::Value = serde_json::from_slice(&ev.to_json().unwrap()).unwrap();
    assert_eq!(json["changed_by"], "admin");

    let back: CustomerChanged = serde_json::from_value(json).unwrap();
    assert_eq!(back.customer, ev.customer);
}
