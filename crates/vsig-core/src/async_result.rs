// ── Asynchronous results ──
//
// Every remote operation hands back an `AsyncResult<T>` immediately.
// The dispatching task owns the matching `Resolver<T>` and completes it
// exactly once; callers block (`wait`), await (`resolved`), poll, or
// attach a single continuation.
//
// Subscriptions follow the same split: an `AsyncSubscription<T>` is fed
// by a `Feeder<T>` until the first error, which ends it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, error};

use crate::error::SdkError;

type Outcome<T> = Result<T, SdkError>;
type Continuation<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

struct State<T> {
    outcome: Option<Outcome<T>>,
    continuation: Option<Continuation<T>>,
    continuation_registered: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    done: watch::Sender<bool>,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn new(outcome: Option<Outcome<T>>) -> Arc<Self> {
        let (done, _) = watch::channel(outcome.is_some());
        Arc::new(Self {
            state: Mutex::new(State {
                outcome,
                continuation: None,
                continuation_registered: false,
            }),
            done,
        })
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, outcome: Outcome<T>) {
        let continuation = {
            let mut state = self.lock();
            debug_assert!(state.outcome.is_none(), "AsyncResult resolved twice");
            if state.outcome.is_some() {
                error!("ignoring second resolution of an AsyncResult");
                return;
            }
            state.outcome = Some(outcome.clone());
            state.continuation.take()
        };
        self.done.send_replace(true);

        // Runs outside the lock so the continuation may inspect the result.
        if let Some(continuation) = continuation {
            continuation(outcome);
        }
    }
}

// ── AsyncResult ──────────────────────────────────────────────────────

/// Handle to the eventual outcome of a remote operation.
///
/// Clones share the same underlying state.
pub struct AsyncResult<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for AsyncResult<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> AsyncResult<T> {
    /// A pending result plus the resolver that completes it.
    pub fn pending() -> (Resolver<T>, Self) {
        let shared = Shared::new(None);
        let resolver = Resolver {
            shared: Some(Arc::clone(&shared)),
        };
        (resolver, Self { shared })
    }

    pub fn ready(value: T) -> Self {
        Self {
            shared: Shared::new(Some(Ok(value))),
        }
    }

    pub fn failed(error: SdkError) -> Self {
        Self {
            shared: Shared::new(Some(Err(error))),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.shared.lock().outcome.is_none()
    }

    /// Non-blocking check. Repeated polls after completion return the
    /// same outcome.
    pub fn poll(&self) -> Option<Outcome<T>> {
        self.shared.lock().outcome.clone()
    }

    /// Block the current thread until the operation completes.
    ///
    /// Meant for plain threads. On a runtime worker use
    /// [`resolved`](Self::resolved) instead, since blocking a worker can
    /// starve the task that would resolve this result. Waiting on a
    /// pending result from inside a current-thread runtime can never
    /// finish and fails with `SdkError::Programming` instead.
    pub fn wait(&self) -> Outcome<T> {
        if self.is_pending() {
            ensure_blocking_allowed()?;
        }
        futures::executor::block_on(self.resolved())
    }

    /// Wait asynchronously for the operation to complete.
    pub async fn resolved(&self) -> Outcome<T> {
        let mut done = self.shared.done.subscribe();
        // The sender lives in `shared`, which we hold, so this cannot fail.
        let _ = done.wait_for(|finished| *finished).await;
        self.poll().unwrap_or_else(|| {
            Err(SdkError::programming(
                "result signalled completion without an outcome",
            ))
        })
    }

    /// Attach the single continuation.
    ///
    /// It runs exactly once: on the resolving thread, or right away on
    /// the calling thread if the result is already complete. A second
    /// registration is rejected.
    pub fn on_complete<F>(&self, f: F) -> Result<(), SdkError>
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        let mut state = self.shared.lock();
        if state.continuation_registered {
            return Err(SdkError::programming(
                "a continuation is already registered on this result",
            ));
        }
        state.continuation_registered = true;

        match state.outcome.clone() {
            Some(outcome) => {
                drop(state);
                f(outcome);
            }
            None => state.continuation = Some(Box::new(f)),
        }
        Ok(())
    }

    /// Derive a result by transforming the success value.
    ///
    /// Uses this result's continuation slot.
    pub fn map<U, F>(&self, f: F) -> AsyncResult<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (resolver, mapped) = AsyncResult::pending();
        match self.on_complete(move |outcome| resolver.resolve(outcome.map(f))) {
            Ok(()) => mapped,
            Err(e) => AsyncResult::failed(e),
        }
    }
}

impl<T> fmt::Debug for AsyncResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let status = match &state.outcome {
            None => "pending",
            Some(Ok(_)) => "ready",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("AsyncResult").field("state", &status).finish()
    }
}

// ── Resolver ─────────────────────────────────────────────────────────

/// Completes its paired [`AsyncResult`]. Consumed on use.
///
/// Dropping a resolver without calling [`resolve`](Self::resolve) fails
/// the result with `SdkError::Transport`, so waiters never hang. This is
/// what callers see when the runtime driving a request shuts down.
pub struct Resolver<T: Clone + Send + 'static> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T: Clone + Send + 'static> Resolver<T> {
    pub fn resolve(mut self, outcome: Outcome<T>) {
        if let Some(shared) = self.shared.take() {
            shared.complete(outcome);
        }
    }
}

impl<T: Clone + Send + 'static> Drop for Resolver<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.complete(Err(SdkError::transport(
                "operation was dropped before producing a result",
            )));
        }
    }
}

fn ensure_blocking_allowed() -> Result<(), SdkError> {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
            Err(SdkError::programming(
                "blocking wait inside a current-thread runtime would never complete; await instead",
            ))
        }
        _ => Ok(()),
    }
}

// ── AsyncSubscription ────────────────────────────────────────────────

type ItemSink<T> = Box<dyn FnMut(T) + Send>;
type ErrorSink = Box<dyn FnOnce(SdkError) + Send>;

struct Feed<T> {
    buffered: VecDeque<T>,
    error: Option<SdkError>,
    cancelled: bool,
}

impl<T> Feed<T> {
    fn is_closed(&self) -> bool {
        self.cancelled || self.error.is_some()
    }
}

// Held while callbacks run, which keeps delivery in feed order.
struct Sinks<T> {
    on_item: Option<ItemSink<T>>,
    on_error: Option<ErrorSink>,
    error_reported: bool,
}

struct Channel<T> {
    feed: Mutex<Feed<T>>,
    sinks: Mutex<Sinks<T>>,
    changed: watch::Sender<()>,
}

impl<T> Channel<T> {
    fn feed(&self) -> MutexGuard<'_, Feed<T>> {
        self.feed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sinks(&self) -> MutexGuard<'_, Sinks<T>> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, item: T) {
        let mut sinks = self.sinks();
        if self.feed().is_closed() {
            return;
        }
        match sinks.on_item.as_mut() {
            Some(on_item) => on_item(item),
            None => {
                self.feed().buffered.push_back(item);
                self.changed.send_replace(());
            }
        }
    }

    fn fail(&self, error: SdkError) {
        let mut sinks = self.sinks();
        {
            let mut feed = self.feed();
            if feed.is_closed() {
                return;
            }
            feed.error = Some(error.clone());
        }
        self.changed.send_replace(());

        if let Some(on_error) = sinks.on_error.take() {
            sinks.error_reported = true;
            on_error(error);
        }
    }
}

/// Stream of items from a long-lived remote operation.
///
/// Items are delivered in the order they were produced, either to the
/// [`on_item`](Self::on_item) callback or, when none is registered, to
/// [`recv`](Self::recv) and friends. The first error ends the
/// subscription and is reported to [`on_error`](Self::on_error) once.
/// Callbacks run on the feeding task and must not register further
/// callbacks on the same subscription.
///
/// Dropping the subscription cancels it.
pub struct AsyncSubscription<T> {
    channel: Arc<Channel<T>>,
    task: Option<AbortHandle>,
}

impl<T: Send + 'static> AsyncSubscription<T> {
    /// An open subscription plus the feeder that supplies it.
    pub fn pending() -> (Feeder<T>, Self) {
        let (changed, _) = watch::channel(());
        let channel = Arc::new(Channel {
            feed: Mutex::new(Feed {
                buffered: VecDeque::new(),
                error: None,
                cancelled: false,
            }),
            sinks: Mutex::new(Sinks {
                on_item: None,
                on_error: None,
                error_reported: false,
            }),
            changed,
        });
        let feeder = Feeder {
            channel: Some(Arc::clone(&channel)),
        };
        (feeder, Self { channel, task: None })
    }

    /// Tie the task driving this subscription to its lifetime.
    pub(crate) fn with_task(mut self, task: AbortHandle) -> Self {
        self.task = Some(task);
        self
    }

    /// Deliver every item to `f`, starting with any already buffered.
    pub fn on_item<F>(&self, f: F) -> &Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let mut sinks = self.channel.sinks();
        let backlog: Vec<T> = self.channel.feed().buffered.drain(..).collect();
        let on_item = sinks.on_item.insert(Box::new(f));
        for item in backlog {
            on_item(item);
        }
        self
    }

    /// Report the terminal error to `f`, right away if it already happened.
    pub fn on_error<F>(&self, f: F) -> &Self
    where
        F: FnOnce(SdkError) + Send + 'static,
    {
        let mut sinks = self.channel.sinks();
        if sinks.error_reported {
            return self;
        }
        let error = self.channel.feed().error.clone();
        match error {
            Some(error) => {
                sinks.error_reported = true;
                f(error);
            }
            None => sinks.on_error = Some(Box::new(f)),
        }
        self
    }

    /// Next buffered item without waiting.
    ///
    /// `None` means nothing has arrived yet. Once the subscription has
    /// ended and its buffer is drained, every call returns the error
    /// that ended it.
    pub fn try_recv(&self) -> Option<Outcome<T>> {
        let mut feed = self.channel.feed();
        if let Some(item) = feed.buffered.pop_front() {
            return Some(Ok(item));
        }
        if feed.cancelled {
            return Some(Err(SdkError::programming("subscription was cancelled")));
        }
        feed.error.clone().map(Err)
    }

    /// Wait asynchronously for the next item.
    pub async fn recv(&self) -> Outcome<T> {
        loop {
            // Subscribe before checking so no push slips in between.
            let mut changed = self.channel.changed.subscribe();
            if let Some(outcome) = self.try_recv() {
                return outcome;
            }
            // The sender lives in `channel`, which we hold.
            let _ = changed.changed().await;
        }
    }

    /// Block the current thread until the next item arrives.
    ///
    /// Same restrictions as [`AsyncResult::wait`].
    pub fn blocking_recv(&self) -> Outcome<T> {
        if let Some(outcome) = self.try_recv() {
            return outcome;
        }
        ensure_blocking_allowed()?;
        futures::executor::block_on(self.recv())
    }

    /// `false` once the subscription has failed or been cancelled.
    pub fn is_active(&self) -> bool {
        !self.channel.feed().is_closed()
    }

    /// Stop receiving. Buffered items stay readable.
    pub fn cancel(&self) {
        {
            let mut feed = self.channel.feed();
            if feed.is_closed() {
                return;
            }
            feed.cancelled = true;
        }
        if let Some(task) = &self.task {
            task.abort();
        }
        self.channel.changed.send_replace(());
        debug!("subscription cancelled");
    }
}

impl<T> Drop for AsyncSubscription<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<T> fmt::Debug for AsyncSubscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let feed = self.channel.feed();
        let status = if feed.cancelled {
            "cancelled"
        } else if feed.error.is_some() {
            "failed"
        } else {
            "active"
        };
        f.debug_struct("AsyncSubscription")
            .field("state", &status)
            .field("buffered", &feed.buffered.len())
            .finish_non_exhaustive()
    }
}

/// Supplies items to its paired [`AsyncSubscription`].
///
/// Dropping a feeder without calling [`fail`](Self::fail) ends the
/// subscription with `SdkError::Transport`.
pub struct Feeder<T> {
    channel: Option<Arc<Channel<T>>>,
}

impl<T> Feeder<T> {
    pub fn push(&self, item: T) {
        if let Some(channel) = &self.channel {
            channel.push(item);
        }
    }

    /// End the subscription with `error`.
    pub fn fail(mut self, error: SdkError) {
        if let Some(channel) = self.channel.take() {
            channel.fail(error);
        }
    }

    /// `false` once the subscriber has cancelled or the feed has ended.
    pub fn is_open(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|channel| !channel.feed().is_closed())
    }
}

impl<T> Drop for Feeder<T> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.fail(SdkError::transport("subscription feed stopped"));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ready_and_failed_are_terminal() {
        let ok = AsyncResult::ready(5_u32);
        assert!(!ok.is_pending());
        assert_eq!(ok.poll(), Some(Ok(5)));
        assert_eq!(ok.wait(), Ok(5));

        let err = AsyncResult::<u32>::failed(SdkError::transport("down"));
        assert_eq!(err.wait(), Err(SdkError::transport("down")));
    }

    #[test]
    fn polls_are_consistent_after_resolution() {
        let (resolver, result) = AsyncResult::pending();
        assert_eq!(result.poll(), None);
        resolver.resolve(Ok("on".to_owned()));
        assert_eq!(result.poll(), Some(Ok("on".to_owned())));
        assert_eq!(result.poll(), Some(Ok("on".to_owned())));
        assert_eq!(result.wait(), Ok("on".to_owned()));
    }

    #[test]
    fn wait_blocks_until_resolved_from_another_thread() {
        let (resolver, result) = AsyncResult::pending();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(Ok(42_i64));
        });
        assert_eq!(result.wait(), Ok(42));
        worker.join().unwrap();
    }

    #[test]
    fn dropped_resolver_fails_the_result() {
        let (resolver, result) = AsyncResult::<bool>::pending();
        drop(resolver);
        assert!(matches!(result.wait(), Err(SdkError::Transport { .. })));
    }

    #[test]
    fn concurrent_polls_agree_before_and_after_resolution() {
        let (resolver, result) = AsyncResult::pending();
        let barrier = Arc::new(Barrier::new(9));

        let pollers: Vec<_> = (0..8)
            .map(|_| {
                let result = result.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let before = result.poll();
                    barrier.wait();
                    barrier.wait();
                    (before, result.poll())
                })
            })
            .collect();

        barrier.wait();
        resolver.resolve(Ok(7_u16));
        barrier.wait();

        for poller in pollers {
            let (before, after) = poller.join().unwrap();
            assert_eq!(before, None);
            assert_eq!(after, Some(Ok(7)));
        }
    }

    #[tokio::test]
    async fn wait_inside_current_thread_runtime_is_refused() {
        let (resolver, result) = AsyncResult::<u8>::pending();
        assert!(matches!(result.wait(), Err(SdkError::Programming { .. })));
        assert!(result.is_pending());

        resolver.resolve(Ok(3));
        assert_eq!(result.wait(), Ok(3));
        assert_eq!(AsyncResult::ready(1_u8).wait(), Ok(1));
    }

    #[test]
    fn continuation_registered_before_resolution_fires_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (resolver, result) = AsyncResult::pending();

        let counter = Arc::clone(&calls);
        result
            .on_complete(move |outcome| {
                assert_eq!(outcome, Ok(1_u8));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        resolver.resolve(Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let _ = result.poll();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn continuation_registered_after_resolution_fires_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = AsyncResult::<u8>::failed(SdkError::transport("down"));

        let counter = Arc::clone(&calls);
        result
            .on_complete(move |outcome| {
                assert!(outcome.is_err());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_continuation_is_rejected() {
        let result = AsyncResult::ready(());
        result.on_complete(|_| {}).unwrap();
        assert!(matches!(
            result.on_complete(|_| {}),
            Err(SdkError::Programming { .. })
        ));
    }

    #[test]
    fn map_transforms_value_and_passes_errors() {
        let (resolver, result) = AsyncResult::pending();
        let doubled = result.map(|v: i32| v * 2);
        assert!(doubled.is_pending());
        resolver.resolve(Ok(21));
        assert_eq!(doubled.wait(), Ok(42));

        let failed = AsyncResult::<i32>::failed(SdkError::transport("down")).map(|v| v + 1);
        assert_eq!(failed.wait(), Err(SdkError::transport("down")));
    }

    #[test]
    fn resolved_future_is_ready_for_completed_results() {
        let result = AsyncResult::ready("done".to_owned());
        assert_eq!(
            tokio_test::block_on(result.resolved()),
            Ok("done".to_owned())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolved_awaits_on_the_runtime() {
        let (resolver, result) = AsyncResult::pending();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resolver.resolve(Ok(vec![1_u32, 2]));
        });
        assert_eq!(result.resolved().await, Ok(vec![1, 2]));
    }

    // ── Subscriptions ────────────────────────────────────────────────

    #[test]
    fn buffered_items_are_received_in_order() {
        let (feeder, subscription) = AsyncSubscription::pending();
        assert!(subscription.try_recv().is_none());
        for i in 1..=3_u32 {
            feeder.push(i);
        }
        assert_eq!(subscription.blocking_recv(), Ok(1));
        assert_eq!(subscription.try_recv(), Some(Ok(2)));
        assert_eq!(subscription.blocking_recv(), Ok(3));
        assert!(subscription.is_active());
    }

    #[test]
    fn on_item_drains_backlog_then_follows_the_feed() {
        let (feeder, subscription) = AsyncSubscription::pending();
        feeder.push("a");
        feeder.push("b");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        subscription.on_item(move |item| sink.lock().unwrap().push(item));
        feeder.push("c");

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
        assert!(subscription.try_recv().is_none());
    }

    #[test]
    fn first_error_ends_the_feed_and_is_reported_once() {
        let (feeder, subscription) = AsyncSubscription::<u8>::pending();
        let errors = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&errors);
        subscription.on_error(move |e| sink.lock().unwrap().push(e));
        feeder.push(1);
        feeder.fail(SdkError::transport("link lost"));

        assert_eq!(subscription.try_recv(), Some(Ok(1)));
        assert_eq!(
            subscription.try_recv(),
            Some(Err(SdkError::transport("link lost")))
        );
        assert!(!subscription.is_active());

        // A later registration does not see the error a second time.
        let sink = Arc::clone(&errors);
        subscription.on_error(move |e| sink.lock().unwrap().push(e));
        assert_eq!(*errors.lock().unwrap(), vec![SdkError::transport("link lost")]);
    }

    #[test]
    fn error_before_registration_is_reported_on_registration() {
        let (feeder, subscription) = AsyncSubscription::<u8>::pending();
        drop(feeder);

        let reported = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&reported);
        subscription.on_error(move |e| *sink.lock().unwrap() = Some(e));
        assert!(matches!(
            *reported.lock().unwrap(),
            Some(SdkError::Transport { .. })
        ));
    }

    #[test]
    fn cancelled_subscription_ignores_further_items() {
        let (feeder, subscription) = AsyncSubscription::pending();
        feeder.push(1_i32);
        subscription.cancel();
        feeder.push(2);

        assert!(!feeder.is_open());
        assert_eq!(subscription.try_recv(), Some(Ok(1)));
        assert!(matches!(
            subscription.try_recv(),
            Some(Err(SdkError::Programming { .. }))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recv_wakes_when_an_item_arrives() {
        let (feeder, subscription) = AsyncSubscription::pending();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            feeder.push(vec![4_u64]);
            feeder.fail(SdkError::transport("done"));
        });
        assert_eq!(subscription.recv().await, Ok(vec![4]));
        assert_eq!(subscription.recv().await, Err(SdkError::transport("done")));
    }
}
