//! Typed access to vehicle signals held by a remote data broker.
//!
//! This crate owns the signal tree and the request machinery between
//! application code and a [`vsig_api::Transport`]:
//!
//! - **[`Node`]**: One element of the signal tree. Paths are the dotted
//!   join of ancestor names (`Vehicle.Cabin.Light`) and never change once
//!   built. Parents own their children; children link back weakly.
//!
//! - **[`DataPoint<T>`]**: A leaf node with a compile-time value type.
//!   [`get()`](DataPoint::get) verifies the broker's reply against `T`;
//!   [`set()`](DataPoint::set) is only attempted for actuators.
//!
//! - **[`AsyncResult<T>`]**: Handle returned by every remote operation.
//!   Completed exactly once by its [`Resolver`]; callers `wait()`,
//!   `resolved().await`, `poll()`, or attach one continuation.
//!   [`AsyncSubscription<T>`] is its streaming sibling, returned by
//!   [`DataPoint::subscribe`].
//!
//! - **[`DataPointBatch`]**: Many reads and writes sent as a single
//!   exchange, with per-entry outcomes in a [`BatchResult`].
//!
//! - **[`Model`] / [`Service`]**: Tree roots used by generated vehicle
//!   models, bound to a [`ModelContext`] that carries the transport,
//!   runtime handle and [`ClientConfig`].

pub mod async_result;
pub mod batch;
pub mod config;
pub mod context;
pub mod datapoint;
pub mod error;
pub mod model;
pub mod node;
pub mod value;

// ── Primary re-exports ──────────────────────────────────────────────
pub use async_result::{AsyncResult, AsyncSubscription, Feeder, Resolver};
pub use batch::{BatchResult, DataPointBatch, EntryOutcome};
pub use config::{ClientConfig, MAX_IN_FLIGHT_LIMIT};
pub use context::ModelContext;
pub use datapoint::DataPoint;
pub use error::SdkError;
pub use model::{Model, Service, ServiceDiscovery, ServiceMetadata};
pub use node::{Node, PATH_SEPARATOR, Role};
pub use value::{Sample, SignalType};

pub use vsig_api::{MemoryBroker, Transport, WireType, WireValue};
