use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Barrier;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::model::WorkerId;

/// Round-robin turn token granting one worker at a time exclusive use of the
/// shared native dialog resource.
///
/// The wait is a bounded poll rather than a notification: turn-holding periods
/// run seconds to minutes, so poll latency is noise.
pub struct TurnScheduler {
    inner: Mode,
}

enum Mode {
    /// Single worker: a permanent implicit turn
    Single,
    Shared {
        state: Mutex<TurnState>,
        poll_interval: Duration,
    },
}

struct TurnState {
    current: WorkerId,
    /// Workers that have left the rotation; the token skips over them so the
    /// remaining workers can keep draining the queue
    retired: Vec<bool>,
}

impl TurnState {
    fn rotate(&mut self) {
        let workers = self.retired.len();
        for _ in 0..workers {
            self.current = (self.current + 1) % workers;
            if !self.retired[self.current] {
                return;
            }
        }
        // Everyone retired; the token's position no longer matters
    }
}

impl TurnScheduler {
    pub fn single() -> Self {
        Self { inner: Mode::Single }
    }

    pub fn shared(workers: usize, poll_interval: Duration) -> Self {
        Self {
            inner: Mode::Shared {
                state: Mutex::new(TurnState {
                    current: 0,
                    retired: vec![false; workers],
                }),
                poll_interval,
            },
        }
    }

    /// Build the scheduler appropriate for the pool size
    pub fn for_pool(workers: usize, poll_interval: Duration) -> Self {
        if workers <= 1 {
            Self::single()
        } else {
            Self::shared(workers, poll_interval)
        }
    }

    /// Block until the token equals `worker`. Unbounded: a worker waits for
    /// its turn until the run is externally terminated.
    pub async fn wait_for_turn(&self, worker: WorkerId) {
        match &self.inner {
            Mode::Single => {}
            Mode::Shared {
                state,
                poll_interval,
            } => loop {
                {
                    let state = state.lock().expect("turn state poisoned");
                    if state.current == worker {
                        debug!(worker, "Turn acquired");
                        return;
                    }
                }
                sleep(*poll_interval).await;
            },
        }
    }

    /// Rotate the token to the next live worker. Called after a worker
    /// finishes (success or exhausted-retry) its current task.
    pub fn advance(&self) {
        if let Mode::Shared { state, .. } = &self.inner {
            let mut state = state.lock().expect("turn state poisoned");
            state.rotate();
            debug!(next = state.current, "Turn advanced");
        }
    }

    /// Remove a worker from the rotation. Called when a worker terminates,
    /// whether on an empty queue or on a session failure; if the departing
    /// worker holds the token, it passes on.
    pub fn retire(&self, worker: WorkerId) {
        if let Mode::Shared { state, .. } = &self.inner {
            let mut state = state.lock().expect("turn state poisoned");
            state.retired[worker] = true;
            if state.current == worker {
                state.rotate();
            }
            debug!(worker, "Worker retired from turn rotation");
        }
    }

    /// The worker currently holding the token, if turns are shared
    pub fn current(&self) -> Option<WorkerId> {
        match &self.inner {
            Mode::Single => None,
            Mode::Shared { state, .. } => {
                Some(state.lock().expect("turn state poisoned").current)
            }
        }
    }
}

/// Startup barrier: workers finish their one-time session setup, then wait
/// here so the pool starts claiming turns together.
///
/// A timeout does not abort the run; it degrades to an unsynchronized start.
pub struct StartGate {
    barrier: Option<Arc<Barrier>>,
    timeout: Duration,
}

impl StartGate {
    pub fn new(workers: usize, wait_timeout: Duration) -> Self {
        Self {
            barrier: (workers > 1).then(|| Arc::new(Barrier::new(workers))),
            timeout: wait_timeout,
        }
    }

    pub async fn arrive(&self, worker: WorkerId) {
        let Some(barrier) = &self.barrier else {
            return;
        };
        debug!(worker, "Waiting at startup gate");
        match timeout(self.timeout, barrier.wait()).await {
            Ok(_) => info!(worker, "All workers ready"),
            Err(_) => warn!(
                worker,
                "Startup gate timed out; proceeding without synchronized start"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_single_mode_is_a_noop() {
        let turns = TurnScheduler::for_pool(1, Duration::from_secs(1));
        turns.wait_for_turn(0).await;
        turns.advance();
        assert_eq!(turns.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_is_fair() {
        let workers = 3;
        let turns = Arc::new(TurnScheduler::for_pool(workers, Duration::from_secs(1)));
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut handles = vec![];
        for worker in 0..workers {
            let turns = Arc::clone(&turns);
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                for _ in 0..4 {
                    turns.wait_for_turn(worker).await;
                    log.lock().unwrap().push(worker);
                    turns.advance();
                }
                turns.retire(worker);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 12);
        // Strict round-robin order in worker-id rotation
        for (i, worker) in log.iter().enumerate() {
            assert_eq!(*worker, i % workers);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_mutual_exclusion() {
        let workers = 4;
        let turns = Arc::new(TurnScheduler::for_pool(workers, Duration::from_millis(100)));
        let holders = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for worker in 0..workers {
            let turns = Arc::clone(&turns);
            let holders = Arc::clone(&holders);
            handles.push(tokio::spawn(async move {
                for _ in 0..3 {
                    turns.wait_for_turn(worker).await;
                    assert_eq!(holders.fetch_add(1, Ordering::SeqCst), 0);
                    sleep(Duration::from_millis(50)).await;
                    holders.fetch_sub(1, Ordering::SeqCst);
                    turns.advance();
                }
                turns.retire(worker);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retired_workers_are_skipped() {
        let turns = TurnScheduler::for_pool(3, Duration::from_millis(10));
        assert_eq!(turns.current(), Some(0));

        // Worker 1 leaves; rotation from 0 must land on 2
        turns.retire(1);
        turns.advance();
        assert_eq!(turns.current(), Some(2));
        turns.advance();
        assert_eq!(turns.current(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retiring_token_holder_passes_it_on() {
        let turns = TurnScheduler::for_pool(3, Duration::from_millis(10));
        turns.retire(0);
        assert_eq!(turns.current(), Some(1));
        // The other two can still drain turns between them
        turns.wait_for_turn(1).await;
        turns.advance();
        turns.wait_for_turn(2).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_releases_when_all_arrive() {
        let gate = Arc::new(StartGate::new(3, Duration::from_secs(10)));
        let mut handles = vec![];
        for worker in 0..3 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move { gate.arrive(worker).await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_timeout_is_nonfatal() {
        // Only one of two workers ever arrives; the wait must end on its own
        let gate = StartGate::new(2, Duration::from_secs(10));
        gate.arrive(0).await;
    }

    #[tokio::test]
    async fn test_gate_single_worker_skips_barrier() {
        let gate = StartGate::new(1, Duration::from_secs(10));
        gate.arrive(0).await;
    }
}
