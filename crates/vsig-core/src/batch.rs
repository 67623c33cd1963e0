// ── Request batching ──
//
// A `DataPointBatch` collects reads and writes keyed by path and sends
// them to the broker as one exchange. Outcomes are reported per entry:
// one bad path never hides the others, while a failed exchange fails
// every entry with the same error.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::debug;
use vsig_api::{BatchOp, BatchReply, WireType, WireValue};

use crate::async_result::AsyncResult;
use crate::context::ModelContext;
use crate::datapoint::DataPoint;
use crate::error::SdkError;
use crate::node::Role;
use crate::value::{SignalType, check_wire, decode};

/// Outcome of one batch entry: a value for gets, `None` for sets.
pub type EntryOutcome = Result<Option<WireValue>, SdkError>;

#[derive(Debug, Clone)]
enum Staged {
    Get { expected: Option<WireType> },
    Set(WireValue),
    Rejected(SdkError),
}

/// Staged reads and writes, unique by path, in staging order.
#[derive(Debug)]
pub struct DataPointBatch {
    ctx: ModelContext,
    entries: IndexMap<String, Staged>,
}

impl DataPointBatch {
    pub fn new(ctx: ModelContext) -> Self {
        Self {
            ctx,
            entries: IndexMap::new(),
        }
    }

    // ── Staging ──────────────────────────────────────────────────

    // `IndexMap::insert` keeps the position of an existing key, so
    // re-staging a path replaces its operation in place.
    fn stage(&mut self, path: String, staged: Staged) -> &mut Self {
        self.entries.insert(path, staged);
        self
    }

    /// Stage an untyped read of `path`.
    pub fn stage_get(&mut self, path: impl Into<String>) -> &mut Self {
        self.stage(path.into(), Staged::Get { expected: None })
    }

    /// Stage an untyped write of `path`.
    pub fn stage_set(&mut self, path: impl Into<String>, value: WireValue) -> &mut Self {
        self.stage(path.into(), Staged::Set(value))
    }

    /// Stage a read whose reply must match `T`.
    pub fn add_get<T: SignalType>(&mut self, point: &DataPoint<T>) -> &mut Self {
        self.stage(
            point.path().to_owned(),
            Staged::Get {
                expected: Some(T::WIRE_TYPE),
            },
        )
    }

    /// Stage a write. Non-actuators are rejected locally and reported in
    /// the result without being sent.
    pub fn add_set<T: SignalType>(&mut self, point: &DataPoint<T>, value: T) -> &mut Self {
        let staged = if point.role() == Role::Actuator {
            Staged::Set(value.into_wire())
        } else {
            Staged::Rejected(SdkError::NotActuator {
                path: point.path().to_owned(),
            })
        };
        self.stage(point.path().to_owned(), staged)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ── Submission ───────────────────────────────────────────────

    /// Send every staged entry as one request.
    pub fn submit(self) -> AsyncResult<BatchResult> {
        let Self { ctx, entries } = self;
        if entries.is_empty() {
            return AsyncResult::ready(BatchResult::default());
        }

        let ops: Vec<BatchOp> = entries
            .iter()
            .filter_map(|(path, staged)| match staged {
                Staged::Get { .. } => Some(BatchOp::get(path.clone())),
                Staged::Set(value) => Some(BatchOp::set(path.clone(), value.clone())),
                Staged::Rejected(_) => None,
            })
            .collect();

        if ops.is_empty() {
            return AsyncResult::ready(assemble(entries, Ok(Vec::new())));
        }

        debug!(entries = entries.len(), sent = ops.len(), "submitting batch");
        let label = format!("{} entries", entries.len());
        ctx.dispatch_with(
            "batch",
            &label,
            move |transport| async move { transport.send_batch(ops).await.map_err(SdkError::from) },
            move |exchange| Ok(assemble(entries, exchange)),
        )
    }
}

/// Match broker replies back onto staged entries.
fn assemble(
    entries: IndexMap<String, Staged>,
    exchange: Result<Vec<BatchReply>, SdkError>,
) -> BatchResult {
    let mut replies: HashMap<String, BatchReply> = match exchange {
        Ok(replies) => replies.into_iter().map(|r| (r.path.clone(), r)).collect(),
        Err(batch_error) => {
            let entries = entries
                .into_iter()
                .map(|(path, staged)| {
                    let outcome = match staged {
                        Staged::Rejected(e) => Err(e),
                        Staged::Get { .. } | Staged::Set(_) => Err(batch_error.clone()),
                    };
                    (path, outcome)
                })
                .collect();
            return BatchResult {
                entries,
                timestamps: HashMap::new(),
            };
        }
    };

    let mut timestamps = HashMap::new();
    let entries = entries
        .into_iter()
        .map(|(path, staged)| {
            let reply = replies.remove(&path);
            let outcome = match staged {
                Staged::Rejected(e) => Err(e),
                Staged::Get { expected } => match reply {
                    Some(BatchReply {
                        result: Ok(Some(wire)),
                        timestamp,
                        ..
                    }) => {
                        if let Some(timestamp) = timestamp {
                            timestamps.insert(path.clone(), timestamp);
                        }
                        check_wire(&path, expected, wire).map(Some)
                    }
                    Some(BatchReply { result: Ok(None), .. }) => Err(SdkError::transport(format!(
                        "broker acknowledged the read of {path} without a value"
                    ))),
                    Some(BatchReply { result: Err(e), .. }) => Err(e.into()),
                    None => Err(missing_reply(&path)),
                },
                Staged::Set(_) => match reply {
                    Some(BatchReply { result: Ok(_), .. }) => Ok(None),
                    Some(BatchReply { result: Err(e), .. }) => Err(e.into()),
                    None => Err(missing_reply(&path)),
                },
            };
            (path, outcome)
        })
        .collect();

    BatchResult {
        entries,
        timestamps,
    }
}

fn missing_reply(path: &str) -> SdkError {
    SdkError::transport(format!("broker reply did not include {path}"))
}

// ── BatchResult ──────────────────────────────────────────────────────

/// Per-path outcomes of a submitted batch, in staging order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    entries: IndexMap<String, EntryOutcome>,
    timestamps: HashMap<String, DateTime<Utc>>,
}

impl BatchResult {
    pub fn outcome(&self, path: &str) -> Option<&EntryOutcome> {
        self.entries.get(path)
    }

    /// Broker timestamp of a value read in this batch, when reported.
    pub fn timestamp(&self, path: &str) -> Option<DateTime<Utc>> {
        self.timestamps.get(path).copied()
    }

    /// Typed value read for `point`.
    pub fn value<T: SignalType>(&self, point: &DataPoint<T>) -> Result<T, SdkError> {
        match self.entries.get(point.path()) {
            Some(Ok(Some(wire))) => decode::<T>(point.path(), wire.clone()),
            Some(Ok(None)) => Err(SdkError::programming(format!(
                "{} was staged as a write, not a read",
                point.path()
            ))),
            Some(Err(e)) => Err(e.clone()),
            None => Err(SdkError::programming(format!(
                "{} was not part of this batch",
                point.path()
            ))),
        }
    }

    /// Failed entries, keyed by path.
    pub fn errors(&self) -> IndexMap<String, SdkError> {
        self.entries
            .iter()
            .filter_map(|(path, outcome)| {
                outcome
                    .as_ref()
                    .err()
                    .map(|e| (path.clone(), e.clone()))
            })
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.entries.values().all(Result::is_ok)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, EntryOutcome> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a BatchResult {
    type Item = (&'a String, &'a EntryOutcome);
    type IntoIter = indexmap::map::Iter<'a, String, EntryOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
