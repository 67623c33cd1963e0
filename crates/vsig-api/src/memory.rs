// ── In-process broker ──
//
// A `Transport` backed by a concurrent map instead of a network
// connection. It applies the same per-signal rules a real broker does
// (unknown paths, access control, actuator-only writes, strict types),
// fans every accepted change out to subscribers, and can simulate
// outages and latency. Used by the test suites and for running
// applications without a broker process.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, trace};

use crate::error::Error;
use crate::transport::{
    BatchOp, BatchReply, BrokerOp, Reading, SignalUpdate, Transport, UpdateStream,
};
use crate::wire::{EntryType, WireType, WireValue};

/// Static description of a signal known to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMeta {
    pub entry_type: EntryType,
    pub data_type: WireType,
}

#[derive(Debug, Clone)]
struct Signal {
    meta: SignalMeta,
    value: WireValue,
    updated: Option<DateTime<Utc>>,
}

struct Subscriber {
    paths: HashSet<String>,
    tx: mpsc::UnboundedSender<Result<SignalUpdate, Error>>,
}

/// Catalogue entry accepted by [`MemoryBroker::from_json`].
#[derive(Debug, Deserialize)]
struct CatalogueEntry {
    path: String,
    entry_type: EntryType,
    data_type: WireType,
    #[serde(default)]
    value: Option<WireValue>,
}

/// Thread-safe in-memory broker.
pub struct MemoryBroker {
    endpoint: String,
    signals: DashMap<String, Signal>,
    denied: DashSet<String>,
    subscribers: DashMap<u64, Subscriber>,
    next_subscriber: AtomicU64,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new("memory://local")
    }
}

impl MemoryBroker {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            signals: DashMap::new(),
            denied: DashSet::new(),
            subscribers: DashMap::new(),
            next_subscriber: AtomicU64::new(0),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Build a broker from a JSON array of
    /// `{ "path", "entry_type", "data_type", "value"? }` objects.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let entries: Vec<CatalogueEntry> = serde_json::from_str(json)
            .map_err(|e| Error::Protocol(format!("invalid signal catalogue: {e}")))?;

        let broker = Self::default();
        for entry in entries {
            broker.register(
                &entry.path,
                SignalMeta {
                    entry_type: entry.entry_type,
                    data_type: entry.data_type,
                },
            );
            if let Some(value) = entry.value {
                broker.publish(&entry.path, value)?;
            }
        }
        Ok(broker)
    }

    // ── Catalogue ────────────────────────────────────────────────

    /// Register (or re-register) a signal. Its value starts out unavailable.
    pub fn register(&self, path: &str, meta: SignalMeta) {
        self.signals.insert(
            path.to_owned(),
            Signal {
                meta,
                value: WireValue::Unavailable,
                updated: None,
            },
        );
    }

    pub fn with_sensor(self, path: &str, data_type: WireType) -> Self {
        self.with_signal(path, EntryType::Sensor, data_type)
    }

    pub fn with_actuator(self, path: &str, data_type: WireType) -> Self {
        self.with_signal(path, EntryType::Actuator, data_type)
    }

    pub fn with_attribute(self, path: &str, data_type: WireType) -> Self {
        self.with_signal(path, EntryType::Attribute, data_type)
    }

    pub fn with_signal(self, path: &str, entry_type: EntryType, data_type: WireType) -> Self {
        self.register(
            path,
            SignalMeta {
                entry_type,
                data_type,
            },
        );
        self
    }

    pub fn meta(&self, path: &str) -> Option<SignalMeta> {
        self.signals.get(path).map(|s| s.meta)
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    // ── Provider side ────────────────────────────────────────────

    /// Update a signal's value the way a feeder/provider would.
    ///
    /// Unlike client writes this is allowed for every entry type, but
    /// the value must still match the declared data type.
    pub fn publish(&self, path: &str, value: WireValue) -> Result<(), Error> {
        let mut signal = self
            .signals
            .get_mut(path)
            .ok_or_else(|| Error::UnknownPath { path: path.into() })?;
        check_type(path, signal.meta.data_type, &value)?;
        self.store(path, &mut signal, value);
        Ok(())
    }

    /// Current value without going through the transport interface.
    pub fn value(&self, path: &str) -> Option<WireValue> {
        self.signals.get(path).map(|s| s.value.clone())
    }

    /// When `path` last changed, if it ever held a value.
    pub fn updated_at(&self, path: &str) -> Option<DateTime<Utc>> {
        self.signals.get(path).and_then(|s| s.updated)
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // Runs while the caller holds the signal's entry, so subscribers see
    // changes to one path in the order they were stored.
    fn store(&self, path: &str, signal: &mut Signal, value: WireValue) {
        let now = Utc::now();
        signal.value = value.clone();
        signal.updated = Some(now);

        if self.subscribers.is_empty() {
            return;
        }
        let update = SignalUpdate {
            path: path.to_owned(),
            value,
            timestamp: now,
        };
        // Drop subscribers whose receiving end has gone away.
        self.subscribers.retain(|_, sub| {
            !sub.paths.contains(path) || sub.tx.send(Ok(update.clone())).is_ok()
        });
    }

    // ── Fault injection ──────────────────────────────────────────

    /// Toggle the simulated connection. Going down fails and closes
    /// every open subscription.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if available {
            return;
        }

        let closed: Vec<u64> = self.subscribers.iter().map(|entry| *entry.key()).collect();
        for id in closed {
            if let Some((_, sub)) = self.subscribers.remove(&id) {
                let _ = sub.tx.send(Err(Error::Unavailable {
                    endpoint: self.endpoint.clone(),
                }));
            }
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Deny all access to `path`.
    pub fn deny(&self, path: &str) {
        self.denied.insert(path.to_owned());
    }

    // ── Request handling ─────────────────────────────────────────

    fn ensure_available(&self) -> Result<(), Error> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Unavailable {
                endpoint: self.endpoint.clone(),
            })
        }
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn read(&self, path: &str) -> Result<Reading, Error> {
        if self.denied.contains(path) {
            return Err(Error::AccessDenied { path: path.into() });
        }
        self.signals
            .get(path)
            .map(|s| Reading {
                value: s.value.clone(),
                timestamp: s.updated,
            })
            .ok_or_else(|| Error::UnknownPath { path: path.into() })
    }

    fn write(&self, path: &str, value: WireValue) -> Result<(), Error> {
        if self.denied.contains(path) {
            return Err(Error::AccessDenied { path: path.into() });
        }
        let mut signal = self
            .signals
            .get_mut(path)
            .ok_or_else(|| Error::UnknownPath { path: path.into() })?;
        if signal.meta.entry_type != EntryType::Actuator {
            return Err(Error::NotActuator { path: path.into() });
        }
        check_type(path, signal.meta.data_type, &value)?;
        self.store(path, &mut signal, value);
        Ok(())
    }

    fn open_subscription(&self, paths: Vec<String>) -> Result<UpdateStream, Error> {
        if paths.is_empty() {
            return Err(Error::Protocol("subscription names no paths".into()));
        }
        for path in &paths {
            if self.denied.contains(path) {
                return Err(Error::AccessDenied { path: path.clone() });
            }
            if !self.signals.contains_key(path) {
                return Err(Error::UnknownPath { path: path.clone() });
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(
            id,
            Subscriber {
                paths: paths.iter().cloned().collect(),
                tx: tx.clone(),
            },
        );

        // Current values first, the same way a real broker opens a stream.
        for path in paths {
            let Some(signal) = self.signals.get(&path) else {
                continue;
            };
            let Some(timestamp) = signal.updated.filter(|_| signal.value.is_payload()) else {
                continue;
            };
            let _ = tx.send(Ok(SignalUpdate {
                value: signal.value.clone(),
                path,
                timestamp,
            }));
        }
        debug!(subscriber = id, "memory broker subscription opened");
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

fn check_type(path: &str, expected: WireType, value: &WireValue) -> Result<(), Error> {
    match value.wire_type() {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(Error::TypeMismatch {
            path: path.into(),
            expected,
            actual,
        }),
        None => Err(Error::InvalidValue {
            path: path.into(),
            reason: format!("cannot store {value}"),
        }),
    }
}

impl Transport for MemoryBroker {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn send_get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<WireValue, Error>> {
        Box::pin(async move {
            self.simulate_latency().await;
            self.ensure_available()?;
            trace!(path, "memory broker get");
            self.read(path).map(|reading| reading.value)
        })
    }

    fn send_get_reading<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Reading, Error>> {
        Box::pin(async move {
            self.simulate_latency().await;
            self.ensure_available()?;
            trace!(path, "memory broker get with timestamp");
            self.read(path)
        })
    }

    fn send_set<'a>(&'a self, path: &'a str, value: WireValue) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            self.simulate_latency().await;
            self.ensure_available()?;
            trace!(path, %value, "memory broker set");
            self.write(path, value)
        })
    }

    fn send_batch(&self, ops: Vec<BatchOp>) -> BoxFuture<'_, Result<Vec<BatchReply>, Error>> {
        Box::pin(async move {
            self.simulate_latency().await;
            self.ensure_available()?;
            debug!(entries = ops.len(), "memory broker batch");

            // No await between entries: the whole batch is applied in one step.
            let replies = ops
                .into_iter()
                .map(|BatchOp { path, op }| match op {
                    BrokerOp::Get => match self.read(&path) {
                        Ok(Reading { value, timestamp }) => {
                            BatchReply::new(path, Ok(Some(value))).with_timestamp(timestamp)
                        }
                        Err(e) => BatchReply::new(path, Err(e)),
                    },
                    BrokerOp::Set(value) => {
                        let result = self.write(&path, value).map(|()| None);
                        BatchReply::new(path, result)
                    }
                })
                .collect();
            Ok(replies)
        })
    }

    fn subscribe(&self, paths: Vec<String>) -> BoxFuture<'_, Result<UpdateStream, Error>> {
        Box::pin(async move {
            self.simulate_latency().await;
            self.ensure_available()?;
            self.open_subscription(paths)
        })
    }
}
