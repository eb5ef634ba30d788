use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rivulet_api::runner::ApplicationRunner;
use rivulet_api::{InMemorySystem, LocalApplicationRunner, StreamApplication};
use rivulet_core::codec::KvSerde;
use rivulet_core::config::{Config, JOB_PARTITIONS};
use rivulet_core::task::{MessageCollector, RequestScope, TaskCoordinator};
use rivulet_core::time::ManualClock;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct Order {
    id: String,
    item: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct Payment {
    order_id: String,
    cents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct PaidOrder {
    id: String,
    item: String,
    cents: u64,
}

#[test]
fn test_orders_join_payments() {
    let system = InMemorySystem::new();
    system.create_stream("orders", 2);
    system.create_stream("payments", 2);
    for (id, item) in [("o-1", "book"), ("o-2", "lamp")] {
        let order = Order {
            id: id.to_string(),
            item: item.to_string(),
        };
        system.send("orders", id.to_string(), order, None).unwrap();
    }
    for (id, cents) in [("o-1", 1_200u64), ("o-3", 99)] {
        let payment = Payment {
            order_id: id.to_string(),
            cents,
        };
        system.send("payments", id.to_string(), payment, None).unwrap();
    }

    let app = StreamApplication::new("paid-orders");
    let orders = app
        .open_input::<Order>("orders", KvSerde::bincode::<String, Order>())
        .unwrap();
    let payments = app
        .open_input::<Payment>("payments", KvSerde::bincode::<String, Payment>())
        .unwrap();
    let paid = app
        .open_output::<PaidOrder>("paid", KvSerde::bincode::<String, PaidOrder>())
        .unwrap();
    orders
        .join(
            &payments,
            |order: &Order| order.id.clone(),
            |payment: &Payment| payment.order_id.clone(),
            |order: &Order, payment: &Payment| PaidOrder {
                id: order.id.clone(),
                item: order.item.clone(),
                cents: payment.cents,
            },
            Duration::from_secs(60),
        )
        .send_to(&paid);

    // same key bytes hash to the same partition on both streams
    let config = Config::new().with(JOB_PARTITIONS, 2);
    LocalApplicationRunner::new(config, system.clone())
        .with_clock(Arc::new(ManualClock::new(0)))
        .run(&app)
        .unwrap();

    let out: Vec<(String, PaidOrder)> = system.read_all("paid").unwrap();
    assert_eq!(
        out,
        vec![(
            "o-1".to_string(),
            PaidOrder {
                id: "o-1".to_string(),
                item: "book".to_string(),
                cents: 1_200,
            }
        )]
    );
}

#[test]
fn test_commit_and_shutdown_from_sink() {
    let system = InMemorySystem::new();
    system.create_stream("commands", 1);
    for command in ["a", "b", "stop", "c"] {
        system
            .send("commands", command.to_string(), command.to_string(), None)
            .unwrap();
    }

    let app = StreamApplication::new("stopper");
    app.open_input::<String>("commands", KvSerde::bincode::<String, String>())
        .unwrap()
        .sink(
            |command: &String,
             _: &mut dyn MessageCollector,
             coordinator: &mut dyn TaskCoordinator|
             -> Result<()> {
                coordinator.commit(RequestScope::CurrentTask);
                if command == "stop" {
                    coordinator.shutdown(RequestScope::AllTasksInContainer);
                }
                Ok(())
            },
        );

    let summary = LocalApplicationRunner::new(Config::new(), system)
        .run(&app)
        .unwrap();
    assert!(summary.shutdown_requested);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.commits, 3);
}

#[test]
fn test_failing_operator_fails_the_run() {
    let system = InMemorySystem::new();
    system.create_stream("numbers", 1);
    system.send("numbers", 0u8, 0u32, None).unwrap();

    let app = StreamApplication::new("divider");
    let out = app
        .open_output::<u32>("quotients", KvSerde::bincode::<u8, u32>())
        .unwrap();
    app.open_input::<u32>("numbers", KvSerde::bincode::<u8, u32>())
        .unwrap()
        .try_map(|n: &u32| {
            100u32
                .checked_div(*n)
                .ok_or_else(|| anyhow::anyhow!("division by zero"))
        })
        .send_to(&out);

    let err = LocalApplicationRunner::new(Config::new(), system)
        .run(&app)
        .unwrap_err();
    assert!(format!("{err:#}").contains("division by zero"));
}

#[test]
fn test_duplicate_input_is_rejected() {
    let app = StreamApplication::new("dup");
    app.open_input::<u32>("numbers", KvSerde::bincode::<u8, u32>())
        .unwrap();
    assert!(
        app.open_input::<u32>("numbers", KvSerde::bincode::<u8, u32>())
            .is_err()
    );
}
