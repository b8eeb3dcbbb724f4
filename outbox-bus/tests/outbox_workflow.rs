use anyhow::Result as AnyResult;
use outbox_bus::error::OutboxError;
use outbox_bus::event::Event;
use outbox_bus::eventing::{BusConfig, EventBus, EventHandler, InMemoryBroker, handler_fn};
use outbox_bus::outbox::{InMemoryOutboxStore, OutboxPublisher, PublisherConfig, write_event};
use outbox_bus_macros::integration_event;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[integration_event(topic = "customers", event_type = "customer.created")]
#[derive(Default, PartialEq)]
struct CustomerCreated {
    id: String,
    email: String,
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<CustomerCreated>>,
}

#[async_trait::async_trait]
impl EventHandler<CustomerCreated> for Recorder {
    async fn handle(&self, event: CustomerCreated) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(event);
        Ok(())
    }
}

fn customer(id: &str) -> CustomerCreated {
    CustomerCreated {
        id: id.into(),
        email: format!("{id}@example.com"),
    }
}

async fn eventually<F: Fn() -> bool>(cond: F) -> bool {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

fn fast_publisher() -> PublisherConfig {
    PublisherConfig {
        process_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

#[tokio::test]
async fn rolled_back_transaction_leaves_no_outbox_row() -> AnyResult<()> {
    let store = InMemoryOutboxStore::new();

    let mut tx = store.begin();
    write_event(&mut tx, &customer("c-1")).await?;
    tx.rollback()?;

    let mut tx = store.begin();
    write_event(&mut tx, &customer("c-2")).await?;
    tx.commit()?;

    let rows = store.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].event_type(), "customer.created");
    assert_eq!(rows[0].event_payload(), customer("c-2").to_json()?.as_slice());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn committed_event_reaches_typed_handler() -> AnyResult<()> {
    let store = InMemoryOutboxStore::new();
    let broker = InMemoryBroker::new();
    let bus = Arc::new(EventBus::new(Arc::new(broker.clone()), BusConfig::default())?);

    let recorder = Arc::new(Recorder::default());
    let topic = bus.subscribe::<CustomerCreated, _>(recorder.clone()).await?;
    assert_eq!(topic, "customers");

    let token = CancellationToken::new();
    let consuming = tokio::spawn(bus.clone().start_consuming(token.clone()));

    let publisher = OutboxPublisher::new(Arc::new(store.clone()), bus.clone(), fast_publisher());
    publisher.start()?;

    let mut tx = store.begin();
    write_event(&mut tx, &customer("c-1")).await?;
    tx.commit()?;

    assert!(eventually(|| !recorder.seen.lock().unwrap().is_empty()).await);
    assert_eq!(*recorder.seen.lock().unwrap(), vec![customer("c-1")]);

    let row = store.get(1).expect("row exists");
    assert!(row.published_at().is_some());
    assert_eq!(row.times_attempted(), 1);

    // 总线上的字节与 Outbox 行完全一致
    let messages = broker.messages("customers");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].key(), "customer.created");
    assert_eq!(messages[0].value(), row.event_payload());

    publisher.stop().await?;
    token.cancel();
    consuming.await??;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn broker_outage_is_retried_until_delivered() -> AnyResult<()> {
    let store = InMemoryOutboxStore::new();
    let broker = InMemoryBroker::new();
    let bus = Arc::new(EventBus::new(Arc::new(broker.clone()), BusConfig::default())?);

    let mut tx = store.begin();
    write_event(&mut tx, &customer("c-1")).await?;
    tx.commit()?;

    broker.fail_next_writes(3);
    let publisher = OutboxPublisher::new(Arc::new(store.clone()), bus.clone(), fast_publisher());
    publisher.start()?;

    assert!(eventually(|| store.pending_count() == 0).await);
    publisher.stop().await?;

    let row = store.get(1).expect("row exists");
    assert_eq!(row.times_attempted(), 4);
    assert_eq!(broker.messages("customers").len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_handler_does_not_block_siblings() -> AnyResult<()> {
    let broker = InMemoryBroker::new();
    let bus = Arc::new(EventBus::new(Arc::new(broker.clone()), BusConfig::default())?);

    let a_calls = Arc::new(AtomicUsize::new(0));
    let b_seen = Arc::new(Mutex::new(Vec::<String>::new()));

    let a = {
        let calls = a_calls.clone();
        handler_fn("handler-a", move |_: CustomerCreated| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow::anyhow!("handler a always fails"))
            }
        })
    };
    let b = {
        let seen = b_seen.clone();
        handler_fn("handler-b", move |ev: CustomerCreated| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(ev.id);
                Ok::<(), anyhow::Error>(())
            }
        })
    };

    bus.subscribe::<CustomerCreated, _>(a).await?;
    bus.subscribe::<CustomerCreated, _>(b).await?;
    assert_eq!(bus.handler_count("customers").await, 2);

    let token = CancellationToken::new();
    let consuming = tokio::spawn(bus.clone().start_consuming(token.clone()));

    bus.publish("customers", &customer("c-1")).await?;
    bus.publish("customers", &customer("c-2")).await?;

    assert!(eventually(|| b_seen.lock().unwrap().len() == 2).await);
    assert!(eventually(|| a_calls.load(Ordering::SeqCst) == 2).await);
    let mut seen = b_seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["c-1".to_string(), "c-2".to_string()]);

    token.cancel();
    consuming.await??;
    Ok(())
}

#[tokio::test]
async fn cancelled_cycle_publishes_nothing() -> AnyResult<()> {
    let store = InMemoryOutboxStore::new();
    let broker = InMemoryBroker::new();
    let bus = Arc::new(EventBus::new(Arc::new(broker.clone()), BusConfig::default())?);

    let mut tx = store.begin();
    for id in ["c-1", "c-2"] {
        write_event(&mut tx, &customer(id)).await?;
    }
    tx.commit()?;

    let publisher =
        OutboxPublisher::new(Arc::new(store.clone()), bus, PublisherConfig::default());
    let token = CancellationToken::new();
    token.cancel();

    let report = publisher.process_outbox(&token).await?;
    assert_eq!(report.fetched, 2);
    assert_eq!(report.skipped, 2);
    assert!(broker.messages("customers").is_empty());
    assert!(store.rows().iter().all(|r| r.times_attempted() == 0));
    Ok(())
}

#[tokio::test]
async fn writing_into_finished_transaction_is_rejected() -> AnyResult<()> {
    let store = InMemoryOutboxStore::new();
    let mut tx = store.begin();
    tx.commit()?;

    let err = write_event(&mut tx, &customer("late")).await.unwrap_err();
    assert!(matches!(err, OutboxError::InvalidArgument { .. }));
    assert!(store.rows().is_empty());
    Ok(())
}
