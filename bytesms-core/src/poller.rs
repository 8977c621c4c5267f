//! Periodic refresh of a thread or the conversation list.
//!
//! The message store has no change notifications, so views re-fetch on a
//! timer. A [`Poller`] owns that timer as a cancellable background task:
//!
//! - fetches once immediately, then every `interval` ± `jitter`;
//! - publishes a snapshot on a `watch` channel **only when it changed**;
//! - on store errors, backs off exponentially up to `max_backoff` and keeps
//!   the last good snapshot;
//! - `refresh_now()` skips the remaining wait; `stop()` / `restart()` are
//!   idempotent.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::gateway::{ConversationSummary, MessageStore, StoredMessage};

/// Boxed future returned by a poll fetch.
pub type FetchFuture<T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send>>;

type FetchFn<T> = Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>;

// ── PollerConfig ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Delay between successful fetches.
    pub interval: Duration,
    /// Relative jitter applied to every delay, `0.0..=1.0`.
    pub jitter: f64,
    /// Ceiling for the error backoff.
    pub max_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            jitter: 0.1,
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl PollerConfig {
    /// Delay before the next fetch after `failures` consecutive errors,
    /// before jitter.
    pub fn base_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.interval;
        }
        let factor = 1u32.checked_shl(failures.min(16)).unwrap_or(u32::MAX);
        self.interval
            .saturating_mul(factor)
            .min(self.max_backoff.max(self.interval))
    }

    /// [`base_delay`](Self::base_delay) with jitter applied.
    pub fn next_delay(&self, failures: u32) -> Duration {
        jittered(self.base_delay(failures), self.jitter)
    }
}

fn jittered(delay: Duration, jitter: f64) -> Duration {
    // NaN would reach gen_range as an empty range.
    if !jitter.is_finite() || jitter <= 0.0 {
        return delay;
    }
    let jitter = jitter.min(1.0);
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    delay.mul_f64(factor)
}

// ── Poller ───────────────────────────────────────────────────────

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Cancellable, restartable periodic fetch publishing on a `watch` channel.
pub struct Poller<T> {
    fetch: FetchFn<T>,
    config: PollerConfig,
    tx: Arc<watch::Sender<Option<Arc<T>>>>,
    wake: Arc<Notify>,
    running: Mutex<Option<Running>>,
}

impl<T> Poller<T>
where
    T: PartialEq + Send + Sync + 'static,
{
    pub fn new<F>(config: PollerConfig, fetch: F) -> Self
    where
        F: Fn() -> FetchFuture<T> + Send + Sync + 'static,
    {
        let (tx, _) = watch::channel(None);
        Self {
            fetch: Arc::new(fetch),
            config,
            tx: Arc::new(tx),
            wake: Arc::new(Notify::new()),
            running: Mutex::new(None),
        }
    }

    /// Start polling. Returns `false` if already running.
    pub fn start(&self) -> bool {
        let mut running = self
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.fetch.clone(),
            self.config.clone(),
            self.tx.clone(),
            self.wake.clone(),
            token.clone(),
        ));
        *running = Some(Running { token, handle });
        true
    }

    /// Stop polling. The last snapshot stays readable.
    pub fn stop(&self) {
        let mut running = self
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(r) = running.take() {
            r.token.cancel();
        }
    }

    pub fn restart(&self) {
        self.stop();
        self.start();
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .map(|r| r.as_ref().is_some_and(|r| !r.handle.is_finished()))
            .unwrap_or(false)
    }

    /// Fetch again without waiting for the timer.
    pub fn refresh_now(&self) {
        self.wake.notify_one();
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.tx.subscribe()
    }

    /// Most recent snapshot, if any fetch has succeeded yet.
    pub fn latest(&self) -> Option<Arc<T>> {
        self.tx.borrow().clone()
    }
}

impl Poller<Vec<StoredMessage>> {
    /// Poll one conversation, newest message first.
    pub fn thread(store: Arc<dyn MessageStore>, address: String, config: PollerConfig) -> Self {
        let address: Arc<str> = address.into();
        Self::new(config, move || {
            let store = store.clone();
            let address = address.clone();
            Box::pin(async move { store.messages(&address).await })
        })
    }
}

impl Poller<Vec<ConversationSummary>> {
    /// Poll the conversation list.
    pub fn conversations(store: Arc<dyn MessageStore>, config: PollerConfig) -> Self {
        Self::new(config, move || {
            let store = store.clone();
            Box::pin(async move { store.conversations().await })
        })
    }
}

impl<T> Drop for Poller<T> {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            if let Some(r) = running.take() {
                r.token.cancel();
            }
        }
    }
}

async fn poll_loop<T>(
    fetch: FetchFn<T>,
    config: PollerConfig,
    tx: Arc<watch::Sender<Option<Arc<T>>>>,
    wake: Arc<Notify>,
    token: CancellationToken,
) where
    T: PartialEq + Send + Sync + 'static,
{
    let mut failures: u32 = 0;

    loop {
        let result = tokio::select! {
            _ = token.cancelled() => break,
            result = fetch() => result,
        };

        match result {
            Ok(snapshot) => {
                if failures > 0 {
                    debug!(failures, "poll recovered");
                }
                failures = 0;
                tx.send_if_modified(|current| {
                    if current.as_deref() == Some(&snapshot) {
                        return false;
                    }
                    *current = Some(Arc::new(snapshot));
                    true
                });
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                warn!(failures, error = %e, "poll failed");
            }
        }

        let delay = config.next_delay(failures);
        tokio::select! {
            _ = token.cancelled() => break,
            _ = wake.notified() => debug!("refresh requested"),
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("poller stopped");
}
