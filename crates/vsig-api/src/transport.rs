// ── Broker transport boundary ──
//
// The physical RPC client lives outside this workspace. Everything the
// signal layer needs from it is captured by the `Transport` trait:
// single get/set, a batched exchange, update streams, and an
// availability check.

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::wire::WireValue;

/// Operation requested for one path inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum BrokerOp {
    Get,
    Set(WireValue),
}

/// One entry of a batched request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOp {
    pub path: String,
    pub op: BrokerOp,
}

impl BatchOp {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            op: BrokerOp::Get,
        }
    }

    pub fn set(path: impl Into<String>, value: WireValue) -> Self {
        Self {
            path: path.into(),
            op: BrokerOp::Set(value),
        }
    }
}

/// Per-entry outcome of a batched request.
///
/// `Ok(Some(value))` answers a get, `Ok(None)` acknowledges a set.
/// Errors here are per-signal; a transport failure fails the whole
/// batch instead.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReply {
    pub path: String,
    pub result: Result<Option<WireValue>, Error>,
    /// When the broker last updated the value, for answered gets.
    pub timestamp: Option<DateTime<Utc>>,
}

impl BatchReply {
    pub fn new(path: impl Into<String>, result: Result<Option<WireValue>, Error>) -> Self {
        Self {
            path: path.into(),
            result,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A value together with the broker's record of when it was last set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: WireValue,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One change pushed to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalUpdate {
    pub path: String,
    pub value: WireValue,
    pub timestamp: DateTime<Utc>,
}

/// Updates for a subscription, in the order the broker produced them.
///
/// An `Err` item reports a transport failure and is the last item of the
/// stream.
pub type UpdateStream = BoxStream<'static, Result<SignalUpdate, Error>>;

/// Connected handle to a data broker.
///
/// Implementations must be safe to share across threads: one transport
/// serves every data point of a model, and requests arrive concurrently.
/// Retry policy, if any, belongs to the implementation.
pub trait Transport: Send + Sync {
    /// Human-readable endpoint, used in logs and `Unavailable` errors.
    fn endpoint(&self) -> &str;

    /// Cheap check: `false` means no request can currently succeed.
    fn is_available(&self) -> bool;

    /// Read the current value of one signal.
    fn send_get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<WireValue, Error>>;

    /// Read one signal together with its update timestamp.
    ///
    /// Transports that cannot report timestamps keep this default.
    fn send_get_reading<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Reading, Error>> {
        Box::pin(async move {
            let value = self.send_get(path).await?;
            Ok(Reading {
                value,
                timestamp: None,
            })
        })
    }

    /// Write one signal.
    fn send_set<'a>(&'a self, path: &'a str, value: WireValue) -> BoxFuture<'a, Result<(), Error>>;

    /// Execute several operations as one logical request.
    ///
    /// The reply may list entries in any order. An `Err` means the
    /// batch as a whole could not be delivered.
    fn send_batch(&self, ops: Vec<BatchOp>) -> BoxFuture<'_, Result<Vec<BatchReply>, Error>>;

    /// Open a stream of updates for `paths`.
    ///
    /// Resolves once the broker has accepted the subscription. Every
    /// path must be known and readable, otherwise nothing is subscribed.
    fn subscribe(&self, paths: Vec<String>) -> BoxFuture<'_, Result<UpdateStream, Error>>;
}
