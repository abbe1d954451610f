use async_trait::async_trait;
use thiserror::Error;

use crate::config::RunConfig;
use crate::model::Task;

/// Errors surfaced by the automation driver collaborator
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("session could not be opened: {0}")]
    SessionOpen(String),

    #[error("artifact transfer could not be started: {0}")]
    Upload(String),
}

/// Outcome of one submit attempt, as reported by the driver.
///
/// `RecoverablePrompt` replaces exception-driven alert handling: an unexpected
/// modal surfaced during submission that the session may be able to dismiss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted,
    RecoverablePrompt,
    Failed(String),
}

/// External collaborator that performs the actual website interaction.
///
/// The coordinator never inspects a session's internals; it is an opaque
/// capability owned by exactly one worker.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    async fn open_session(
        &self,
        config: &RunConfig,
    ) -> std::result::Result<Box<dyn Session>, DriverError>;
}

/// One interactive automation session.
#[async_trait]
pub trait Session: Send {
    /// Start the artifact transfer for a task. This is the operation that
    /// touches the shared native file dialog, so the caller must hold the
    /// turn token.
    async fn begin_upload(&mut self, task: &Task) -> std::result::Result<(), DriverError>;

    /// Attempt to submit the prepared form once
    async fn submit(&mut self, task: &Task) -> SubmitOutcome;

    /// Try to dismiss an unexpected blocking prompt. Returns whether the
    /// prompt went away.
    async fn dismiss_prompt(&mut self) -> bool;

    async fn close(self: Box<Self>);
}

/// Manual-confirmation gate, consulted per task when `auto_submit` is off
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, task: &Task);
}

/// Confirmation that never blocks; the default in auto-submit mode
pub struct AutoConfirm;

#[async_trait]
impl Confirmation for AutoConfirm {
    async fn confirm(&self, _task: &Task) {}
}
