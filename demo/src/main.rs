use anyhow::Result;
use async_trait::async_trait;
use outbox_bus::eventing::{BusConfig, DispatchMode, EventBus, EventHandler, InMemoryBroker};
use outbox_bus::outbox::{InMemoryOutboxStore, OutboxPublisher, PublisherConfig, write_event};
use outbox_bus_macros::integration_event;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
struct Customer {
    id: String,
    name: String,
    email: String,
}

#[integration_event(topic = "customers")]
enum CustomerEvent {
    #[event(event_type = "customer.registered")]
    Registered { customer: Customer },
    #[event(event_type = "customer.email_changed")]
    EmailChanged { id: String, email: String },
}

impl Default for CustomerEvent {
    fn default() -> Self {
        Self::Registered {
            customer: Customer::default(),
        }
    }
}

/// 下游读模型：消费客户事件并维护本地投影
#[derive(Default)]
struct CustomerDirectory {
    customers: Mutex<HashMap<String, Customer>>,
}

#[async_trait]
impl EventHandler<CustomerEvent> for CustomerDirectory {
    fn handler_name(&self) -> &str {
        "customer-directory"
    }

    async fn handle(&self, event: CustomerEvent) -> anyhow::Result<()> {
        let mut customers = self
            .customers
            .lock()
            .map_err(|_| anyhow::anyhow!("directory lock poisoned"))?;
        match event {
            CustomerEvent::Registered { customer } => {
                info!(id = %customer.id, "customer registered");
                customers.insert(customer.id.clone(), customer);
            }
            CustomerEvent::EmailChanged { id, email } => match customers.get_mut(&id) {
                Some(customer) => {
                    info!(%id, %email, "customer email changed");
                    customer.email = email;
                }
                None => anyhow::bail!("unknown customer {id}"),
            },
        }
        Ok(())
    }
}

/// 模拟应用服务：业务变更与事件写入处于同一事务
async fn register_customer(store: &InMemoryOutboxStore, customer: Customer) -> Result<()> {
    let mut tx = store.begin();
    // 此处省略业务表写入
    write_event(&mut tx, &CustomerEvent::Registered { customer }).await?;
    tx.commit()?;
    Ok(())
}

async fn change_email(store: &InMemoryOutboxStore, id: &str, email: &str) -> Result<()> {
    let mut tx = store.begin();
    write_event(
        &mut tx,
        &CustomerEvent::EmailChanged {
            id: id.to_string(),
            email: email.to_string(),
        },
    )
    .await?;
    tx.commit()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let store = InMemoryOutboxStore::new();
    let broker = InMemoryBroker::new();

    let bus = Arc::new(EventBus::new(
        Arc::new(broker.clone()),
        BusConfig {
            dispatch: DispatchMode::Awaited,
            ..Default::default()
        },
    )?);

    let directory = Arc::new(CustomerDirectory::default());
    let topic = bus.subscribe::<CustomerEvent, _>(directory.clone()).await?;
    info!(%topic, "subscribed customer directory");

    let token = CancellationToken::new();
    let consuming = tokio::spawn(bus.clone().start_consuming(token.clone()));

    let publisher = OutboxPublisher::new(
        Arc::new(store.clone()),
        bus.clone(),
        PublisherConfig {
            process_interval: Duration::from_millis(200),
            ..Default::default()
        },
    );
    publisher.start()?;

    register_customer(
        &store,
        Customer {
            id: "c-1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
        },
    )
    .await?;
    change_email(&store, "c-1", "ada@lovelace.dev").await?;

    // 回滚的事务不会产生任何事件
    let mut tx = store.begin();
    write_event(&mut tx, &CustomerEvent::default()).await?;
    tx.rollback()?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = tokio::time::sleep(Duration::from_secs(2)) => {}
    }

    publisher.stop().await?;
    token.cancel();
    match consuming.await? {
        Ok(()) => {}
        Err(err) => warn!(error = %err, "consumer loop ended with error"),
    }

    info!(
        pending = store.pending_count(),
        published = store.rows().len() - store.pending_count(),
        "outbox drained"
    );
    if let Ok(customers) = directory.customers.lock() {
        for customer in customers.values() {
            info!(id = %customer.id, name = %customer.name, email = %customer.email, "projection");
        }
    }

    Ok(())
}
