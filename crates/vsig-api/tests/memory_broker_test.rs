#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use vsig_api::{BatchOp, Error, MemoryBroker, Transport, WireType, WireValue};

// ── Helpers ─────────────────────────────────────────────────────────

fn shared_broker() -> Arc<dyn Transport> {
    let broker = MemoryBroker::new("memory://test")
        .with_actuator("Vehicle.Cabin.Seat.Position", WireType::Uint32)
        .with_sensor("Vehicle.Speed", WireType::Float);
    broker
        .publish("Vehicle.Speed", WireValue::Float(12.0))
        .unwrap();
    Arc::new(broker)
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_writers_leave_one_of_their_values() {
    let broker = shared_broker();

    let writers: Vec<_> = (0..32_u32)
        .map(|i| {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move {
                broker
                    .send_set("Vehicle.Cabin.Seat.Position", WireValue::Uint32(i))
                    .await
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap().unwrap();
    }

    match broker.send_get("Vehicle.Cabin.Seat.Position").await.unwrap() {
        WireValue::Uint32(v) => assert!(v < 32),
        other => panic!("unexpected value {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_mixes_reads_writes_and_rejections() {
    let broker = shared_broker();

    let replies = broker
        .send_batch(vec![
            BatchOp::set("Vehicle.Cabin.Seat.Position", WireValue::Uint32(300)),
            BatchOp::set("Vehicle.Speed", WireValue::Float(1.0)),
            BatchOp::get("Vehicle.Speed"),
        ])
        .await
        .unwrap();

    assert_eq!(replies[0].result, Ok(None));
    assert_eq!(
        replies[1].result,
        Err(Error::NotActuator {
            path: "Vehicle.Speed".into()
        })
    );
    assert_eq!(replies[2].result, Ok(Some(WireValue::Float(12.0))));
}

#[tokio::test(start_paused = true)]
async fn latency_delays_replies() {
    let broker = MemoryBroker::default().with_sensor("A", WireType::Bool);
    broker.set_latency(Duration::from_secs(2));

    let started = tokio::time::Instant::now();
    assert_eq!(broker.send_get("A").await.unwrap(), WireValue::Unavailable);
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test]
async fn endpoint_is_reported_in_outages() {
    let broker = MemoryBroker::new("memory://test");
    broker.set_available(false);
    assert_eq!(broker.endpoint(), "memory://test");
    assert_eq!(
        broker.send_set("A", WireValue::Bool(true)).await,
        Err(Error::Unavailable {
            endpoint: "memory://test".into()
        })
    );
}
