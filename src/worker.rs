use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::driver::{Confirmation, Driver, Session};
use crate::error::{CoordError, Result};
use crate::model::{Task, TaskStatus, WorkerId};
use crate::progress::{EventBus, ProgressAggregator, RunEvent};
use crate::queue::Distributor;
use crate::retry::{RetryEngine, SubmitResult};
use crate::store::CompletionStore;
use crate::turn::{StartGate, TurnScheduler};

/// Shared handles a worker needs for its run
pub struct WorkerContext {
    pub id: WorkerId,
    pub config: Arc<RunConfig>,
    pub store: Arc<dyn CompletionStore>,
    pub distributor: Arc<Distributor>,
    pub turns: Arc<TurnScheduler>,
    pub gate: Arc<StartGate>,
    pub progress: Arc<ProgressAggregator>,
    pub events: EventBus,
    pub confirm: Arc<dyn Confirmation>,
}

/// Per-worker tally reported back to the run
#[derive(Debug, Clone, Default)]
pub struct WorkerSummary {
    pub id: WorkerId,
    pub submitted: usize,
    pub aborted: usize,
}

enum TaskOutcome {
    Submitted,
    Aborted,
}

/// One worker's full lifetime: open a session, synchronize at the startup
/// gate, then claim and process tasks under the turn protocol until the
/// distributor runs dry.
///
/// A session that cannot be opened ends this worker alone; the rest of the
/// pool keeps going. Store errors propagate and end the run.
pub async fn run_worker(ctx: WorkerContext, driver: Arc<dyn Driver>) -> Result<WorkerSummary> {
    let worker = ctx.id;
    info!(worker, "Opening automation session");

    let mut session = match driver.open_session(&ctx.config).await {
        Ok(session) => session,
        Err(e) => {
            warn!(worker, error = %e, "Session open failed; worker exiting");
            ctx.events.emit(RunEvent::WorkerFailed {
                worker,
                reason: e.to_string(),
            });
            ctx.turns.retire(worker);
            return Err(CoordError::SessionOpen {
                worker,
                reason: e.to_string(),
            });
        }
    };

    ctx.gate.arrive(worker).await;

    let result = work_loop(&ctx, session.as_mut()).await;

    // Leave the rotation on every exit path so the remaining workers can
    // keep draining the queue
    ctx.turns.retire(worker);
    session.close().await;

    match &result {
        Ok(summary) => info!(
            worker,
            submitted = summary.submitted,
            aborted = summary.aborted,
            "Worker finished"
        ),
        Err(e) => warn!(worker, error = %e, "Worker aborted"),
    }
    result
}

async fn work_loop(ctx: &WorkerContext, session: &mut dyn Session) -> Result<WorkerSummary> {
    let mut summary = WorkerSummary {
        id: ctx.id,
        ..Default::default()
    };

    loop {
        ctx.turns.wait_for_turn(ctx.id).await;

        let Some(mut task) = ctx.distributor.try_claim(ctx.id) else {
            debug!(worker = ctx.id, "Queue empty; terminating loop");
            break;
        };
        task.status = TaskStatus::InProgress;
        ctx.events.emit(RunEvent::TaskStarted {
            worker: ctx.id,
            task: task.id.clone(),
        });

        match process_one(ctx, session, &mut task).await? {
            TaskOutcome::Submitted => summary.submitted += 1,
            TaskOutcome::Aborted => summary.aborted += 1,
        }

        ctx.turns.advance();
    }

    Ok(summary)
}

/// Process one claimed task: transfer the artifact (turn-guarded), wait out
/// the settle dead time, then drive the retry state machine. On success the
/// completion record is written before the progress counter moves.
async fn process_one(
    ctx: &WorkerContext,
    session: &mut dyn Session,
    task: &mut Task,
) -> Result<TaskOutcome> {
    info!(
        worker = ctx.id,
        task = %task.id,
        size_mb = task.size_mb(),
        "Processing task"
    );

    if let Err(e) = session.begin_upload(task).await {
        warn!(worker = ctx.id, task = %task.id, error = %e, "Artifact transfer failed");
        task.status = TaskStatus::Failed;
        ctx.events.emit(RunEvent::TaskAborted {
            worker: ctx.id,
            task: task.id.clone(),
            attempts: 0,
            reason: e.to_string(),
        });
        return Ok(TaskOutcome::Aborted);
    }

    let settle = task.settle_wait(ctx.config.upload_wait_base, ctx.config.upload_wait_per_mb);
    debug!(worker = ctx.id, task = %task.id, ?settle, "Waiting out upload settle time");
    sleep(settle).await;

    if !ctx.config.auto_submit {
        ctx.confirm.confirm(task).await;
    }

    let engine = RetryEngine::new(
        ctx.config.max_attempts,
        ctx.config.backoff_step,
        ctx.config.submit_timeout,
    );
    match engine.drive(session, task).await {
        SubmitResult::Succeeded { attempts } => {
            // Durable mark happens-before the counter increment, so observers
            // never see progress outrun durability
            ctx.store.mark_completed(&task.id).await?;
            task.status = TaskStatus::Submitted;
            let processed = ctx.progress.increment();
            let (_, total) = ctx.progress.snapshot();
            info!(worker = ctx.id, task = %task.id, attempts, processed, total, "Task submitted");
            ctx.events.emit(RunEvent::TaskSubmitted {
                worker: ctx.id,
                task: task.id.clone(),
                processed,
                total,
            });
            Ok(TaskOutcome::Submitted)
        }
        SubmitResult::AbortedAfterRetries { attempts, reason } => {
            task.status = TaskStatus::Failed;
            warn!(
                worker = ctx.id,
                task = %task.id,
                attempts,
                %reason,
                "Task aborted after retries; continuing with next task"
            );
            ctx.events.emit(RunEvent::TaskAborted {
                worker: ctx.id,
                task: task.id.clone(),
                attempts,
                reason,
            });
            Ok(TaskOutcome::Aborted)
        }
    }
}
