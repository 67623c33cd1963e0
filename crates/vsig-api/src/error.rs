use thiserror::Error;

use crate::wire::WireType;

/// Top-level error type for the `vsig-api` crate.
///
/// Two families share this enum: transport failures (the broker could
/// not be reached or answered garbage) and per-signal rejections that a
/// reachable broker reports for one path. `vsig-core` maps both into
/// caller-facing errors; batch replies carry the per-signal family
/// inside each entry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// No connection to the broker could be used.
    #[error("Broker at {endpoint} is unavailable")]
    Unavailable { endpoint: String },

    /// Connection dropped or refused mid-request.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request timed out.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The broker answered with something the client cannot interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),

    // ── Per-signal ──────────────────────────────────────────────────
    /// The broker has no signal with this path.
    #[error("Unknown data point: {path}")]
    UnknownPath { path: String },

    /// The broker refused access to this path.
    #[error("Access denied for {path}")]
    AccessDenied { path: String },

    /// A write was attempted on a sensor or attribute.
    #[error("{path} is not an actuator")]
    NotActuator { path: String },

    /// A write carried a value of the wrong type.
    #[error("Type mismatch for {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: WireType,
        actual: WireType,
    },

    /// The broker rejected the value itself.
    #[error("Invalid value for {path}: {reason}")]
    InvalidValue { path: String, reason: String },
}

impl Error {
    /// Returns `true` if the failure concerns the connection rather
    /// than one signal. Batch-level failures are always of this kind.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. }
                | Self::Connection(_)
                | Self::Timeout { .. }
                | Self::Protocol(_)
        )
    }

    /// Returns `true` if retrying the same request might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Connection(_) | Self::Timeout { .. }
        )
    }

    /// The signal path this error is about, if it is a per-signal error.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::UnknownPath { path }
            | Self::AccessDenied { path }
            | Self::NotActuator { path }
            | Self::TypeMismatch { path, .. }
            | Self::InvalidValue { path, .. } => Some(path),
            _ => None,
        }
    }
}
