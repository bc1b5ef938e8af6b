//! Cancellable polling loops
//!
//! Every watcher in this crate (claim status, transaction receipt, backend queue)
//! is a `PollSource` driven by the same loop: fetch, publish the snapshot, stop on a
//! terminal snapshot, otherwise sleep and fetch again. Requests inside one loop are
//! strictly sequential; the delay is measured from the completion of the previous
//! fetch.

pub mod claim_poller;
pub mod queue_watcher;
pub mod receipt_watcher;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ClaimError;

pub use claim_poller::{ClaimStatusPoller, ClaimTracker};
pub use queue_watcher::{QueueTracker, QueueWatcher};
pub use receipt_watcher::{ReceiptCallback, ReceiptVerdict, ReceiptWatcher, ReceiptWatch};

/// Something a polling loop can fetch repeatedly
#[async_trait]
pub trait PollSource: Send + Sync + 'static {
    /// Value published after every successful fetch
    type Snapshot: Clone + Send + 'static;

    /// Fetch the current snapshot
    async fn fetch(&self) -> Result<Self::Snapshot, ClaimError>;

    /// Whether the loop should stop after publishing this snapshot
    fn is_terminal(&self, snapshot: &Self::Snapshot) -> bool;

    /// Called once with the terminal snapshot, before the loop completes
    fn on_terminal(&self, _snapshot: &Self::Snapshot) {}

    /// Label used in log lines
    fn describe(&self) -> String;
}

/// Polling loop configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between the completion of one fetch and the start of the next
    pub interval: Duration,

    /// Issue the first fetch right away instead of after one interval
    pub poll_immediately: bool,

    /// Consecutive failures tolerated before giving up (None = retry forever)
    pub max_consecutive_errors: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            poll_immediately: true,
            max_consecutive_errors: Some(12),
        }
    }
}

/// How a polling loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// A terminal snapshot was observed
    Completed(T),
    /// The loop was cancelled before a terminal snapshot
    Cancelled,
    /// Too many consecutive fetch failures; carries the last error
    GaveUp(ClaimError),
}

impl<T> PollOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            PollOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Handle to a running polling loop
///
/// Snapshots are delivered in fetch order. Dropping the handle cancels the loop.
pub struct PollHandle<T> {
    updates: mpsc::UnboundedReceiver<T>,
    token: CancellationToken,
    task: Option<JoinHandle<PollOutcome<T>>>,
}

impl<T: Send + 'static> PollHandle<T> {
    /// Next published snapshot, `None` once the loop has ended and all
    /// snapshots were consumed
    pub async fn next_update(&mut self) -> Option<T> {
        self.updates.recv().await
    }

    /// Stop the loop; a fetch in flight completes but its result is discarded
    ///
    /// Calling this more than once is a no-op.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!("Cancelling polling loop");
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the loop to end
    pub async fn outcome(mut self) -> PollOutcome<T> {
        match self.task.take() {
            Some(task) => match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Polling task aborted: {}", e);
                    PollOutcome::Cancelled
                }
            },
            None => PollOutcome::Cancelled,
        }
    }

    /// Consume the handle as a stream of snapshots
    pub fn into_stream(self) -> impl Stream<Item = T> + Send + Unpin {
        Box::pin(stream::unfold(self, |mut handle| async move {
            handle.updates.recv().await.map(|snapshot| (snapshot, handle))
        }))
    }
}

impl<T> Drop for PollHandle<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Start a polling loop on the current tokio runtime
pub fn spawn_poll<S: PollSource>(source: S, config: PollConfig) -> PollHandle<S::Snapshot> {
    let token = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_poll(source, config, token.clone(), tx));

    PollHandle {
        updates: rx,
        token,
        task: Some(task),
    }
}

async fn run_poll<S: PollSource>(
    source: S,
    config: PollConfig,
    token: CancellationToken,
    updates: mpsc::UnboundedSender<S::Snapshot>,
) -> PollOutcome<S::Snapshot> {
    let label = source.describe();
    let mut consecutive_errors: u32 = 0;
    let mut polls: u64 = 0;

    info!("Polling {} every {:?}", label, config.interval);

    loop {
        if polls > 0 || !config.poll_immediately {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Polling of {} cancelled while waiting", label);
                    return PollOutcome::Cancelled;
                }
                _ = tokio::time::sleep(config.interval) => {}
            }
        }

        if token.is_cancelled() {
            return PollOutcome::Cancelled;
        }

        polls += 1;
        let result = source.fetch().await;

        if token.is_cancelled() {
            debug!("Discarding poll #{} of {}: loop cancelled", polls, label);
            return PollOutcome::Cancelled;
        }

        match result {
            Ok(snapshot) => {
                consecutive_errors = 0;
                let terminal = source.is_terminal(&snapshot);
                // The receiver may be gone; the outcome still carries the result
                let _ = updates.send(snapshot.clone());

                if terminal {
                    info!("Polling of {} finished after {} poll(s)", label, polls);
                    source.on_terminal(&snapshot);
                    return PollOutcome::Completed(snapshot);
                }
                debug!("{} not final yet after poll #{}", label, polls);
            }
            Err(e) => {
                consecutive_errors += 1;
                if e.is_transient() {
                    warn!("Poll #{} of {} failed: {}", polls, label, e);
                } else {
                    error!("Poll #{} of {} failed: {}", polls, label, e);
                }

                if let Some(max) = config.max_consecutive_errors {
                    if consecutive_errors >= max {
                        error!(
                            "Giving up on {} after {} consecutive failures",
                            label, consecutive_errors
                        );
                        return PollOutcome::GaveUp(e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns `Err` for the first `failures` calls, then counts up to `finish_at`
    struct CountingSource {
        calls: Arc<AtomicUsize>,
        failures: usize,
        finish_at: usize,
    }

    #[async_trait]
    impl PollSource for CountingSource {
        type Snapshot = usize;

        async fn fetch(&self) -> Result<usize, ClaimError> {
            let count = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if count <= self.failures {
                return Err(ClaimError::Transport("connection reset".into()));
            }
            Ok(count)
        }

        fn is_terminal(&self, snapshot: &usize) -> bool {
            *snapshot >= self.finish_at
        }

        fn describe(&self) -> String {
            "counter".to_string()
        }
    }

    fn source(failures: usize, finish_at: usize) -> (CountingSource, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            CountingSource {
                calls: calls.clone(),
                failures,
                finish_at,
            },
            calls,
        )
    }

    fn config(poll_immediately: bool, max_errors: Option<u32>) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(5),
            poll_immediately,
            max_consecutive_errors: max_errors,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_terminal_snapshot() {
        let (source, calls) = source(0, 3);
        let handle = spawn_poll(source, config(true, None));

        let snapshots: Vec<usize> = handle.into_stream().collect().await;
        assert_eq!(snapshots, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_timing() {
        let (source, calls) = source(0, 100);
        let _handle = spawn_poll(source, config(false, None));

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let (source, calls) = source(2, 3);
        let handle = spawn_poll(source, config(true, Some(5)));

        assert_eq!(handle.outcome().await, PollOutcome::Completed(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_consecutive_errors() {
        let (source, calls) = source(usize::MAX, 1);
        let handle = spawn_poll(source, config(true, Some(3)));

        let outcome = handle.outcome().await;
        assert!(matches!(outcome, PollOutcome::GaveUp(ClaimError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let (source, calls) = source(0, usize::MAX);
        let mut handle = spawn_poll(source, config(true, None));

        assert_eq!(handle.next_update().await, Some(1));
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());

        assert_eq!(handle.outcome().await, PollOutcome::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Every fetch takes `latency` to resolve and never reaches a terminal value
    struct SlowSource {
        calls: Arc<AtomicUsize>,
        completed: Arc<AtomicUsize>,
        latency: Duration,
    }

    #[async_trait]
    impl PollSource for SlowSource {
        type Snapshot = usize;

        async fn fetch(&self) -> Result<usize, ClaimError> {
            let count = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.latency).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(count)
        }

        fn is_terminal(&self, _snapshot: &usize) -> bool {
            false
        }

        fn describe(&self) -> String {
            "slow counter".to_string()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_fetch_discards_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let source = SlowSource {
            calls: calls.clone(),
            completed: completed.clone(),
            latency: Duration::from_secs(2),
        };
        let mut handle = spawn_poll(source, config(true, None));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 0);
        handle.cancel();

        assert_eq!(handle.next_update().await, None);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(handle.outcome().await, PollOutcome::Cancelled);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_loop() {
        let (source, calls) = source(0, usize::MAX);
        let mut handle = spawn_poll(source, config(true, None));
        assert_eq!(handle.next_update().await, Some(1));
        drop(handle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
