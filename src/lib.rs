//! # Convoy: Batch Upload Task Coordinator
//!
//! Distributes a batch of upload tasks across a small pool of workers that
//! each own one automation session but share a single native file dialog.
//! The coordinator provides the durable dedup store, the shared pull-queue,
//! the round-robin turn protocol, the bounded retry state machine, and the
//! cross-worker progress counters; the website interaction itself is the
//! injected [`Driver`]'s job.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use convoy::{Run, RunConfig};
//!
//! # async fn example(driver: Arc<dyn convoy::Driver>) -> convoy::Result<()> {
//! let config = RunConfig::builder()
//!     .workers(3)
//!     .source_dir("uploads")
//!     .store_path("progress.db")
//!     .build()?;
//!
//! let run = Run::new(config, driver)?;
//! let mut events = run.subscribe();
//! let report = run.execute().await?;
//! println!("{}/{} submitted", report.submitted, report.total);
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod config;
pub mod driver;
pub mod error;
pub mod model;
pub mod progress;
pub mod queue;
pub mod retry;
pub mod source;
pub mod store;
pub mod turn;
pub mod worker;

// Re-exports for convenience
pub use config::{RunConfig, RunConfigBuilder};
pub use driver::{AutoConfirm, Confirmation, Driver, DriverError, Session, SubmitOutcome};
pub use error::{CoordError, Result};
pub use model::{Task, TaskId, TaskStatus, WorkerId};
pub use progress::{EventBus, ProgressAggregator, RunEvent};
pub use queue::{Distributor, WorkQueue};
pub use retry::{RetryEngine, SubmitResult};
pub use source::{MetadataExtractor, NoMetadata, TaskSource};
pub use store::{CompletionRecord, CompletionStore, MemoryCompletionStore, SledCompletionStore};
pub use turn::{StartGate, TurnScheduler};
pub use worker::{WorkerContext, WorkerSummary};

use futures::future::join_all;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::worker::run_worker;

/// Install a global tracing subscriber honoring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Final tally of one run.
///
/// A run that finishes enumeration is a success even when some tasks were
/// aborted; aborted tasks are re-offered on the next run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub total: usize,
    pub submitted: usize,
    pub aborted: usize,
    /// Workers that exited without a session, leaving their share to the pool
    pub failed_workers: Vec<WorkerId>,
    /// Cumulative completion records across all runs
    pub lifetime_completed: u64,
}

/// One coordinated batch run over a task snapshot.
pub struct Run {
    run_id: String,
    config: Arc<RunConfig>,
    driver: Arc<dyn Driver>,
    store: Arc<dyn CompletionStore>,
    metadata: Arc<dyn MetadataExtractor>,
    confirm: Arc<dyn Confirmation>,
    events: EventBus,
}

impl Run {
    /// Build a run with the sled-backed store at `config.store_path`.
    ///
    /// Configuration is validated here, before any worker starts; a store
    /// that cannot be opened is fatal because the at-most-once guarantee
    /// depends on it.
    pub fn new(config: RunConfig, driver: Arc<dyn Driver>) -> Result<Self> {
        config
            .validate()
            .map_err(CoordError::InvalidConfiguration)?;
        let store = Arc::new(SledCompletionStore::open(&config.store_path)?);
        Ok(Self::with_store(config, driver, store))
    }

    /// Build a run against any completion store implementation
    pub fn with_store(
        config: RunConfig,
        driver: Arc<dyn Driver>,
        store: Arc<dyn CompletionStore>,
    ) -> Self {
        Self {
            run_id: cuid2::create_id(),
            config: Arc::new(config),
            driver,
            store,
            metadata: Arc::new(NoMetadata),
            confirm: Arc::new(AutoConfirm),
            events: EventBus::new(256),
        }
    }

    /// Replace the archive metadata collaborator
    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataExtractor>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replace the manual-confirmation gate
    pub fn with_confirmation(mut self, confirm: Arc<dyn Confirmation>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Observe progress and error events for this run
    pub fn subscribe(&self) -> async_broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Execute the run: snapshot the task source, seed the distributor, and
    /// drive the worker pool to completion.
    pub async fn execute(self) -> Result<RunReport> {
        let config = self.config.clone();
        config
            .validate()
            .map_err(CoordError::InvalidConfiguration)?;

        info!(
            run = %self.run_id,
            workers = config.workers,
            source = %config.source_dir.display(),
            "Starting run"
        );

        let source = TaskSource::new(&config.source_dir, self.store.clone(), self.metadata.clone());
        let tasks = source.snapshot().await?;
        let total = tasks.len();

        if total == 0 {
            info!(run = %self.run_id, "Nothing to process");
            self.events.emit(RunEvent::RunCompleted {
                processed: 0,
                total: 0,
            });
            return Ok(RunReport {
                run_id: self.run_id,
                total: 0,
                submitted: 0,
                aborted: 0,
                failed_workers: Vec::new(),
                lifetime_completed: self.store.completed_count().await?,
            });
        }

        let distributor = Arc::new(Distributor::new(tasks, config.workers));
        let turns = Arc::new(TurnScheduler::for_pool(
            config.workers,
            config.turn_poll_interval,
        ));
        let gate = Arc::new(StartGate::new(config.workers, config.barrier_timeout));
        let progress = Arc::new(ProgressAggregator::new(total));

        let mut handles = Vec::with_capacity(config.workers);
        for worker in 0..config.workers {
            if worker > 0 {
                // Stagger session launches; simultaneous starts trip the
                // upstream site's bot protection
                sleep(config.launch_stagger).await;
            }
            let ctx = WorkerContext {
                id: worker,
                config: config.clone(),
                store: self.store.clone(),
                distributor: distributor.clone(),
                turns: turns.clone(),
                gate: gate.clone(),
                progress: progress.clone(),
                events: self.events.clone(),
                confirm: self.confirm.clone(),
            };
            let driver = self.driver.clone();
            handles.push(tokio::spawn(run_worker(ctx, driver)));
        }

        let mut submitted = 0;
        let mut aborted = 0;
        let mut failed_workers = Vec::new();
        let mut fatal: Option<CoordError> = None;

        for (worker, joined) in join_all(handles).await.into_iter().enumerate() {
            match joined {
                Ok(Ok(summary)) => {
                    submitted += summary.submitted;
                    aborted += summary.aborted;
                }
                Ok(Err(e)) if e.is_run_fatal() => {
                    error!(run = %self.run_id, worker, error = %e, "Run-fatal worker error");
                    fatal.get_or_insert(e);
                }
                Ok(Err(e)) => {
                    warn!(run = %self.run_id, worker, error = %e, "Worker failed");
                    failed_workers.push(worker);
                }
                Err(_) => {
                    let e = CoordError::WorkerJoin { worker };
                    error!(run = %self.run_id, worker, error = %e, "Worker task lost");
                    failed_workers.push(worker);
                }
            }
        }

        self.store.flush().await?;
        if let Some(e) = fatal {
            return Err(e);
        }

        let (processed, _) = progress.snapshot();
        if progress.is_complete() {
            self.events.emit(RunEvent::RunCompleted { processed, total });
        }
        info!(
            run = %self.run_id,
            submitted,
            aborted,
            total,
            "Run finished"
        );

        Ok(RunReport {
            run_id: self.run_id,
            total,
            submitted,
            aborted,
            failed_workers,
            lifetime_completed: self.store.completed_count().await?,
        })
    }
}
