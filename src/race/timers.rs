//! Named, cancellable scheduled tasks
//!
//! Every timer belongs to the coordinator state that scheduled it. The
//! coordinator only ever holds one live `TimerId`; a firing whose id does
//! not match it is stale and ignored.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

use super::coordinator::CoordinatorEvent;

/// What a timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Next countdown light
    CountdownStep,
    /// Random delay before the go signal
    GoDelay,
    /// Reaction collection window after the go signal
    RoundTimeout,
}

/// Unique handle for one scheduled firing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    pub kind: TimerKind,
    pub seq: u64,
}

/// Spawned timer tasks, aborted on cancel
pub struct TimerSet {
    events_tx: mpsc::Sender<CoordinatorEvent>,
    pending: HashMap<TimerId, JoinHandle<()>>,
}

impl TimerSet {
    pub fn new(events_tx: mpsc::Sender<CoordinatorEvent>) -> Self {
        Self {
            events_tx,
            pending: HashMap::new(),
        }
    }

    /// Post `TimerFired` back into the event queue after `after`
    pub fn schedule(&mut self, timer: TimerId, after: Duration) {
        let tx = self.events_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx
                .send(CoordinatorEvent::TimerFired {
                    timer,
                    at: Instant::now(),
                })
                .await;
        });

        trace!(?timer, after_ms = after.as_millis() as u64, "Timer scheduled");
        if let Some(previous) = self.pending.insert(timer, handle) {
            previous.abort();
        }
    }

    pub fn cancel(&mut self, timer: TimerId) {
        if let Some(handle) = self.pending.remove(&timer) {
            handle.abort();
            trace!(?timer, "Timer cancelled");
        }
    }

    /// Forget a timer whose event has been delivered
    pub fn fired(&mut self, timer: TimerId) {
        self.pending.remove(&timer);
    }

    pub fn cancel_all(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
