// ── Core error types ──
//
// Caller-facing errors from vsig-core. Every remote failure reaches the
// application as one of these, through the failed state of an
// `AsyncResult`. The `From<vsig_api::Error>` impl translates broker and
// transport errors into them.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdkError {
    // ── Value errors ─────────────────────────────────────────────────
    #[error("No value available for {path}")]
    NotAvailable { path: String },

    #[error("Invalid type for {path}: {message}")]
    InvalidType { path: String, message: String },

    #[error("Invalid value for {path}: {message}")]
    InvalidValue { path: String, message: String },

    // ── Addressing / permission errors ───────────────────────────────
    #[error("Unknown data point: {path}")]
    UnknownPath { path: String },

    #[error("{path} is not an actuator")]
    NotActuator { path: String },

    #[error("Permission denied for {path}")]
    PermissionDenied { path: String },

    // ── Transport errors ─────────────────────────────────────────────
    #[error("Transport error: {message}")]
    Transport { message: String },

    // ── Misuse / setup errors ────────────────────────────────────────
    #[error("Programming error: {message}")]
    Programming { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SdkError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub(crate) fn programming(message: impl Into<String>) -> Self {
        Self::Programming {
            message: message.into(),
        }
    }

    /// The signal path the error refers to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotAvailable { path }
            | Self::InvalidType { path, .. }
            | Self::InvalidValue { path, .. }
            | Self::UnknownPath { path }
            | Self::NotActuator { path }
            | Self::PermissionDenied { path } => Some(path),
            Self::Transport { .. } | Self::Programming { .. } | Self::Config { .. } => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<vsig_api::Error> for SdkError {
    fn from(err: vsig_api::Error) -> Self {
        use vsig_api::Error as E;
        match err {
            E::UnknownPath { path } => Self::UnknownPath { path },
            E::AccessDenied { path } => Self::PermissionDenied { path },
            E::NotActuator { path } => Self::NotActuator { path },
            E::TypeMismatch {
                path,
                expected,
                actual,
            } => Self::InvalidType {
                path,
                message: format!("broker expects {expected}, got {actual}"),
            },
            E::InvalidValue { path, reason } => Self::InvalidValue {
                path,
                message: reason,
            },
            transport @ (E::Unavailable { .. }
            | E::Connection(_)
            | E::Timeout { .. }
            | E::Protocol(_)) => Self::Transport {
                message: transport.to_string(),
            },
        }
    }
}
