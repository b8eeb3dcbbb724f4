use outbox_bus::event::Event;
use outbox_bus_macros::integration_event;

#[integration_event(topic = "orders")]
#[derive(PartialEq)]
enum OrderEvent {
    #[event(event_type = "order.placed")]
    Placed { order_id: String, amount: u64 },
    Shipped(String),
    Cancelled,
}

fn main() {
    let placed = OrderEvent::Placed {
        order_id: "o-1".into(),
        amount: 42,
    };
    assert_eq!(placed.event_type(), "order.placed");
    assert_eq!(OrderEvent::Shipped("o-1".into()).event_type(), "OrderEvent.Shipped");
    assert_eq!(OrderEvent::Cancelled.event_type(), "OrderEvent.Cancelled");
    assert_eq!(OrderEvent::Cancelled.topic(), "orders");
    assert_eq!(OrderEvent::TOPIC, "orders");
    assert_eq!(placed.payload(), &placed);
}
