use outbox_bus::event::Event;
use outbox_bus_macros::integration_event;

#[integration_event(topic = "customers", event_type = "customer.created")]
#[derive(Default, PartialEq)]
struct CustomerCreated {
    id: String,
    name: String,
}

// event_type 缺省为结构体名
#[integration_event(topic = "audit")]
struct AuditTrail {
    entry: String,
}

fn main() {
    let ev = CustomerCreated {
        id: "c-1".into(),
        name: "Ada".into(),
    };
    assert_eq!(ev.event_type(), "customer.created");
    assert_eq!(ev.topic(), "customers");
    assert_eq!(CustomerCreated::TOPIC, "customers");
    assert_eq!(ev.payload(), &ev);
    assert_eq!(ev.clone(), ev);
    assert_eq!(
        ev.to_json().unwrap(),
        br#"{"id":"c-1","name":"Ada"}"#.to_vec()
    );
    assert_eq!(CustomerCreated::default().topic(), "customers");

    let audit = AuditTrail {
        entry: "login".into(),
    };
    assert_eq!(audit.event_type(), "AuditTrail");
    assert_eq!(AuditTrail::EVENT_TYPE, "AuditTrail");
    let _ = format!("{audit:?}");
}
