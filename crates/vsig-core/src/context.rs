// ── Model context ──
//
// Everything a model needs to talk to the broker, passed explicitly:
// the shared transport, the runtime that drives requests, the client
// configuration, and a limiter on concurrent requests. Cloning is
// cheap; all clones share one limiter.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, debug_span, warn};
use vsig_api::{SignalUpdate, Transport};

use crate::async_result::{AsyncResult, AsyncSubscription};
use crate::batch::DataPointBatch;
use crate::config::{ClientConfig, MAX_IN_FLIGHT_LIMIT};
use crate::error::SdkError;

struct ContextInner {
    transport: Arc<dyn Transport>,
    handle: Handle,
    config: ClientConfig,
    permits: Arc<Semaphore>,
}

/// Shared handle bound into every data point of a model.
#[derive(Clone)]
pub struct ModelContext {
    inner: Arc<ContextInner>,
}

impl ModelContext {
    /// `config.max_in_flight` is clamped to `1..=MAX_IN_FLIGHT_LIMIT`.
    pub fn new(transport: Arc<dyn Transport>, handle: Handle, config: ClientConfig) -> Self {
        let max_in_flight = config.max_in_flight.clamp(1, MAX_IN_FLIGHT_LIMIT);
        if max_in_flight != config.max_in_flight {
            warn!(
                requested = config.max_in_flight,
                max_in_flight, "max_in_flight out of range, clamped"
            );
        }
        let permits = Arc::new(Semaphore::new(max_in_flight));
        debug!(
            endpoint = transport.endpoint(),
            max_in_flight,
            timeout = ?config.request_timeout,
            "model context created"
        );
        Self {
            inner: Arc::new(ContextInner {
                transport,
                handle,
                config,
                permits,
            }),
        }
    }

    /// Bind to the runtime the caller is running on.
    pub fn from_current(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
    ) -> Result<Self, SdkError> {
        let handle = Handle::try_current().map_err(|e| SdkError::Config {
            message: format!("no tokio runtime available: {e}"),
        })?;
        Ok(Self::new(transport, handle, config))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    pub fn endpoint(&self) -> &str {
        self.inner.transport.endpoint()
    }

    /// Start an empty batch bound to this context.
    pub fn batch(&self) -> DataPointBatch {
        DataPointBatch::new(self.clone())
    }

    // ── Dispatch ─────────────────────────────────────────────────

    /// Run `request` on the runtime and resolve the returned result with
    /// its outcome.
    pub(crate) fn dispatch<T, F, Fut>(&self, op: &'static str, path: &str, request: F) -> AsyncResult<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(Arc<dyn Transport>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, SdkError>> + Send + 'static,
    {
        self.dispatch_with(op, path, request, |outcome| outcome)
    }

    /// Like [`dispatch`](Self::dispatch), but every outcome of the
    /// exchange, including refusals, timeouts and transport failures,
    /// passes through `finish` before the result is resolved.
    pub(crate) fn dispatch_with<R, T, F, Fut, Fin>(
        &self,
        op: &'static str,
        path: &str,
        request: F,
        finish: Fin,
    ) -> AsyncResult<T>
    where
        R: Send + 'static,
        T: Clone + Send + 'static,
        F: FnOnce(Arc<dyn Transport>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, SdkError>> + Send + 'static,
        Fin: FnOnce(Result<R, SdkError>) -> Result<T, SdkError> + Send + 'static,
    {
        let transport = Arc::clone(&self.inner.transport);
        if !transport.is_available() {
            debug!(op, path, endpoint = transport.endpoint(), "broker unavailable, failing fast");
            let refused = SdkError::from(vsig_api::Error::Unavailable {
                endpoint: transport.endpoint().to_owned(),
            });
            return match finish(Err(refused)) {
                Ok(value) => AsyncResult::ready(value),
                Err(e) => AsyncResult::failed(e),
            };
        }

        let (resolver, result) = AsyncResult::pending();
        let permits = Arc::clone(&self.inner.permits);
        let timeout = self.inner.config.request_timeout;
        let span = debug_span!("vsig_request", op, path);

        self.inner.handle.spawn(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    resolver.resolve(Err(SdkError::programming("request limiter was closed")));
                    return;
                };
                debug!("dispatching");

                let exchange = tokio::time::timeout(timeout, request(transport))
                    .await
                    .unwrap_or_else(|_elapsed| Err(timed_out(timeout)));
                if let Err(e) = &exchange {
                    debug!(error = %e, "request failed");
                }
                resolver.resolve(finish(exchange));
            }
            .instrument(span),
        );

        result
    }

    /// Open a broker subscription for `paths` and feed every update,
    /// after `convert`, into the returned subscription.
    ///
    /// Only the opening handshake counts against the in-flight limit and
    /// the request timeout. `convert` returning `Ok(None)` skips an
    /// update; an error ends the subscription.
    pub(crate) fn subscribe_with<T, F>(
        &self,
        path: &str,
        paths: Vec<String>,
        mut convert: F,
    ) -> AsyncSubscription<T>
    where
        T: Send + 'static,
        F: FnMut(SignalUpdate) -> Result<Option<T>, SdkError> + Send + 'static,
    {
        let (feeder, subscription) = AsyncSubscription::pending();
        let transport = Arc::clone(&self.inner.transport);
        if !transport.is_available() {
            debug!(path, endpoint = transport.endpoint(), "broker unavailable, failing fast");
            feeder.fail(SdkError::from(vsig_api::Error::Unavailable {
                endpoint: transport.endpoint().to_owned(),
            }));
            return subscription;
        }

        let permits = Arc::clone(&self.inner.permits);
        let timeout = self.inner.config.request_timeout;
        let span = debug_span!("vsig_subscription", path);

        let task = self.inner.handle.spawn(
            async move {
                let opened = {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        feeder.fail(SdkError::programming("request limiter was closed"));
                        return;
                    };
                    tokio::time::timeout(timeout, transport.subscribe(paths))
                        .await
                        .unwrap_or_else(|_elapsed| Err(vsig_api::Error::Timeout {
                            timeout_ms: millis(timeout),
                        }))
                };
                let mut updates = match opened {
                    Ok(updates) => updates,
                    Err(e) => {
                        debug!(error = %e, "subscription refused");
                        feeder.fail(e.into());
                        return;
                    }
                };
                debug!("subscription open");

                while let Some(update) = updates.next().await {
                    match update.map_err(SdkError::from).and_then(&mut convert) {
                        Ok(Some(item)) => feeder.push(item),
                        Ok(None) => {}
                        Err(e) => {
                            debug!(error = %e, "subscription ended");
                            feeder.fail(e);
                            return;
                        }
                    }
                }
                feeder.fail(SdkError::transport("broker closed the subscription"));
            }
            .instrument(span),
        );

        subscription.with_task(task.abort_handle())
    }
}

fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

fn timed_out(timeout: Duration) -> SdkError {
    SdkError::from(vsig_api::Error::Timeout {
        timeout_ms: millis(timeout),
    })
}

impl fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelContext")
            .field("endpoint", &self.inner.transport.endpoint())
            .field("config", &self.inner.config)
            .field("available_permits", &self.inner.permits.available_permits())
            .finish_non_exhaustive()
    }
}
