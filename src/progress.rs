use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::model::{TaskId, WorkerId};

/// Cross-worker progress counters.
///
/// Pull-based: the aggregator exposes state and an observer polls `snapshot`
/// on its own cadence, decoupling update rate from display rate. `increment`
/// is called only after a completion record is durably written, so a snapshot
/// never shows progress ahead of durability.
pub struct ProgressAggregator {
    processed: AtomicUsize,
    total: usize,
}

impl ProgressAggregator {
    pub fn new(total: usize) -> Self {
        Self {
            processed: AtomicUsize::new(0),
            total,
        }
    }

    /// Record one completed task; returns the new processed count
    pub fn increment(&self) -> usize {
        let processed = self.processed.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(processed, total = self.total, "Progress advanced");
        processed
    }

    pub fn snapshot(&self) -> (usize, usize) {
        (self.processed.load(Ordering::Acquire), self.total)
    }

    pub fn is_complete(&self) -> bool {
        let (processed, total) = self.snapshot();
        processed >= total
    }
}

/// Observation events for the run.
///
/// Progress and error reporting share this one channel so an operator sees
/// both in one place. The channel is owned by the run, not a process-wide
/// singleton; its lifecycle ends with the run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    TaskStarted {
        worker: WorkerId,
        task: TaskId,
    },
    TaskSubmitted {
        worker: WorkerId,
        task: TaskId,
        processed: usize,
        total: usize,
    },
    TaskAborted {
        worker: WorkerId,
        task: TaskId,
        attempts: u8,
        reason: String,
    },
    WorkerFailed {
        worker: WorkerId,
        reason: String,
    },
    RunCompleted {
        processed: usize,
        total: usize,
    },
}

/// Broadcast bus carrying `RunEvent`s to any number of observers.
///
/// Oldest events are dropped when an observer falls behind; the counters in
/// `ProgressAggregator` remain the source of truth.
#[derive(Clone)]
pub struct EventBus {
    tx: async_broadcast::Sender<RunEvent>,
    _keepalive: async_broadcast::InactiveReceiver<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (mut tx, rx) = async_broadcast::broadcast(capacity);
        tx.set_overflow(true);
        Self {
            tx,
            _keepalive: rx.deactivate(),
        }
    }

    pub fn subscribe(&self) -> async_broadcast::Receiver<RunEvent> {
        self.tx.new_receiver()
    }

    pub fn emit(&self, event: RunEvent) {
        // With overflow on, a full channel drops its oldest event instead of
        // rejecting the new one
        let _ = self.tx.try_broadcast(event);
    }
}
