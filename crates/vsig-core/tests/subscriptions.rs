// Integration tests for following signal changes.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::{mpsc, oneshot};
use vsig_core::{
    ClientConfig, MemoryBroker, Model, ModelContext, Sample, SdkError, WireType, WireValue,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn broker() -> Arc<MemoryBroker> {
    Arc::new(
        MemoryBroker::default()
            .with_sensor("Vehicle.Speed", WireType::Float)
            .with_actuator("Vehicle.Cabin.Light", WireType::Bool),
    )
}

fn vehicle(broker: &Arc<MemoryBroker>) -> Model {
    let ctx = ModelContext::from_current(broker.clone(), ClientConfig::default()).unwrap();
    Model::root("Vehicle", &ctx)
}

async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .unwrap()
}

// ── Delivery ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn updates_arrive_in_publish_order() {
    let broker = broker();
    broker.publish("Vehicle.Speed", WireValue::Float(0.0)).unwrap();
    let speed = vehicle(&broker).sensor::<f32>("Speed");

    let subscription = speed.subscribe();
    // The current value comes first and proves the stream is open.
    let first = within(subscription.recv()).await.unwrap();
    assert!(first.value.abs() < f32::EPSILON);

    for i in 1..=5_u8 {
        broker
            .publish("Vehicle.Speed", WireValue::Float(f32::from(i)))
            .unwrap();
    }

    let mut previous = first.timestamp.unwrap();
    for i in 1..=5_u8 {
        let Sample { value, timestamp } = within(subscription.recv()).await.unwrap();
        assert!((value - f32::from(i)).abs() < f32::EPSILON);
        let timestamp = timestamp.unwrap();
        assert!(timestamp >= previous);
        previous = timestamp;
    }
    assert!(subscription.is_active());
}

#[tokio::test(flavor = "multi_thread")]
async fn own_writes_are_observed_through_callbacks() {
    let broker = broker();
    broker
        .publish("Vehicle.Cabin.Light", WireValue::Bool(false))
        .unwrap();
    let vehicle = vehicle(&broker);
    let light = Model::branch(&vehicle, "Cabin").actuator::<bool>("Light");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = light.subscribe();
    subscription.on_item(move |sample: Sample<bool>| {
        let _ = tx.send(sample.value);
    });
    assert_eq!(within(rx.recv()).await, Some(false));

    light.set(true).resolved().await.unwrap();
    light.set(false).resolved().await.unwrap();
    assert_eq!(within(rx.recv()).await, Some(true));
    assert_eq!(within(rx.recv()).await, Some(false));
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn broker_outage_reaches_on_error() {
    let broker = broker();
    broker.publish("Vehicle.Speed", WireValue::Float(1.0)).unwrap();
    let speed = vehicle(&broker).sensor::<f32>("Speed");

    let subscription = speed.subscribe();
    within(subscription.recv()).await.unwrap();

    let (tx, rx) = oneshot::channel();
    subscription.on_error(move |e| {
        let _ = tx.send(e);
    });
    broker.set_available(false);

    let error = within(rx).await.unwrap();
    assert!(matches!(error, SdkError::Transport { ref message } if message.contains("unavailable")));
    assert!(!subscription.is_active());
}

#[tokio::test(flavor = "multi_thread")]
async fn unavailable_broker_fails_fast() {
    let broker = broker();
    broker.set_available(false);
    let speed = vehicle(&broker).sensor::<f32>("Speed");

    let subscription = speed.subscribe();
    assert!(matches!(
        subscription.try_recv(),
        Some(Err(SdkError::Transport { .. }))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_signal_is_refused() {
    let broker = broker();
    let ghost = vehicle(&broker).sensor::<u32>("Ghost");

    assert_eq!(
        within(ghost.subscribe().recv()).await,
        Err(SdkError::UnknownPath {
            path: "Vehicle.Ghost".into()
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn mistyped_declaration_ends_the_subscription() {
    let broker = broker();
    broker.publish("Vehicle.Speed", WireValue::Float(2.0)).unwrap();
    let as_double = vehicle(&broker).sensor::<f64>("Speed");

    let subscription = as_double.subscribe();
    assert!(matches!(
        within(subscription.recv()).await,
        Err(SdkError::InvalidType { .. })
    ));
    assert!(!subscription.is_active());
}

// ── Lifetime ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn dropping_the_subscription_releases_the_broker_side() {
    let broker = broker();
    broker.publish("Vehicle.Speed", WireValue::Float(1.0)).unwrap();
    let speed = vehicle(&broker).sensor::<f32>("Speed");

    let subscription = speed.subscribe();
    within(subscription.recv()).await.unwrap();
    assert_eq!(broker.subscriber_count(), 1);
    drop(subscription);

    // The broker prunes a subscriber on the first change after it is gone.
    for _ in 0..100 {
        broker.publish("Vehicle.Speed", WireValue::Float(3.0)).unwrap();
        if broker.subscriber_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(broker.subscriber_count(), 0);
}
