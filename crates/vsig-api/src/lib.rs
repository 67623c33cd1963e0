//! Wire boundary between the typed signal layer and a data broker.
//!
//! [`WireValue`] is the dynamically-typed value the broker exchanges,
//! [`Transport`] is everything the signal layer needs from a broker
//! connection (including update streams), and [`MemoryBroker`] is an in-process implementation for
//! tests and local development.

pub mod error;
pub mod memory;
pub mod transport;
pub mod wire;

pub use error::Error;
pub use memory::{MemoryBroker, SignalMeta};
pub use transport::{BatchOp, BatchReply, BrokerOp, Reading, SignalUpdate, Transport, UpdateStream};
pub use wire::{EntryType, WireType, WireValue};
