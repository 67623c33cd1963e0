// ── Client configuration ──
//
// Runtime settings for a `ModelContext`. This struct never reads files
// itself; `vsig-config` builds one from profiles and the environment.

use std::time::Duration;

use tokio::sync::Semaphore;

/// Largest usable `max_in_flight`. Larger values are clamped to it.
pub const MAX_IN_FLIGHT_LIMIT: usize = Semaphore::MAX_PERMITS;

/// Configuration consumed by [`ModelContext`](crate::ModelContext).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Service name of the broker, as resolved by service discovery.
    pub broker_service: String,
    /// Upper bound on a single remote exchange (get, set or batch).
    pub request_timeout: Duration,
    /// Maximum number of requests in flight at once across the context.
    pub max_in_flight: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_service: "vehicledatabroker".into(),
            request_timeout: Duration::from_secs(5),
            max_in_flight: 256,
        }
    }
}
