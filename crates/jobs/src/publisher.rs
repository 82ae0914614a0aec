// crates/jobs/src/publisher.rs
//! Debounced job-state notification channel.
//!
//! Trailing-edge debounce with last-value-wins semantics: a publish
//! schedules delivery after a quiet window, and another publish for the
//! same job id inside the window resets the timer so intermediate
//! states are dropped. Windows for different job ids are independent.
//!
//! Timers are Tokio tasks, so publishing requires a runtime context.
//! Tests drive delivery deterministically with the paused clock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use txflash_types::{FlashJob, JobId};

/// Default quiet window before a published state is delivered.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(10);

const CHANNEL_CAPACITY: usize = 64;

/// Per-job-id debounced publish/subscribe channel.
pub struct CoalescingPublisher {
    window: Duration,
    channels: Mutex<HashMap<JobId, Channel>>,
}

struct Channel {
    tx: broadcast::Sender<FlashJob>,
    pending: Option<JoinHandle<()>>,
}

impl Channel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx, pending: None }
    }
}

impl CoalescingPublisher {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_DEBOUNCE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule delivery of `state` after the quiet window.
    ///
    /// A publish for the same job id arriving before the window elapses
    /// resets the timer; only the latest state is eventually delivered.
    /// Delivering to an id with no subscribers is fine.
    pub fn publish(&self, job_id: &JobId, state: FlashJob) {
        let mut channels = self.lock();
        let channel = channels
            .entry(job_id.clone())
            .or_insert_with(Channel::new);

        if let Some(pending) = channel.pending.take() {
            pending.abort();
        }

        let tx = channel.tx.clone();
        let window = self.window;
        channel.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            // No subscribers is fine.
            let _ = tx.send(state);
        }));
    }

    /// Subscribe to updates for one job id.
    ///
    /// The receiver is the subscription token: dropping it unsubscribes.
    /// A delivery already scheduled when a receiver is dropped still
    /// fires for the remaining subscribers.
    pub fn subscribe(&self, job_id: &JobId) -> broadcast::Receiver<FlashJob> {
        let mut channels = self.lock();
        channels
            .entry(job_id.clone())
            .or_insert_with(Channel::new)
            .tx
            .subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Channel>> {
        match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("publisher channel map lock poisoned");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for CoalescingPublisher {
    fn default() -> Self {
        Self::new()
    }
}
