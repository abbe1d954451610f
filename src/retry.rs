use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::driver::{Session, SubmitOutcome};
use crate::model::Task;

/// Terminal state of one task's submission state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    Succeeded {
        attempts: u8,
    },
    /// Terminal, reported, non-fatal: the task is not marked complete, not
    /// counted in progress, and the run continues.
    AbortedAfterRetries {
        attempts: u8,
        reason: String,
    },
}

/// Per-task submission state machine with a bounded attempt budget and
/// linear backoff.
pub struct RetryEngine {
    max_attempts: u8,
    backoff_step: Duration,
    submit_timeout: Duration,
}

impl RetryEngine {
    pub fn new(max_attempts: u8, backoff_step: Duration, submit_timeout: Duration) -> Self {
        Self {
            max_attempts,
            backoff_step,
            submit_timeout,
        }
    }

    /// Backoff before the retry that follows attempt `n`: `n * backoff_step`
    fn backoff(&self, attempt: u8) -> Duration {
        self.backoff_step * attempt as u32
    }

    /// Drive a task through submission until it succeeds or the attempt
    /// budget is exhausted.
    pub async fn drive(&self, session: &mut dyn Session, task: &Task) -> SubmitResult {
        for attempt in 1..=self.max_attempts {
            debug!(task = %task.id, attempt, "Submitting");

            let outcome = match timeout(self.submit_timeout, session.submit(task)).await {
                Ok(outcome) => outcome,
                Err(_) => SubmitOutcome::Failed(format!(
                    "submit attempt timed out after {:?}",
                    self.submit_timeout
                )),
            };

            match outcome {
                SubmitOutcome::Submitted => {
                    return SubmitResult::Succeeded { attempts: attempt };
                }
                SubmitOutcome::RecoverablePrompt => {
                    if !session.dismiss_prompt().await {
                        // A prompt that cannot be dismissed blocks the form;
                        // remaining attempts would hit the same wall
                        warn!(task = %task.id, attempt, "Prompt could not be dismissed");
                        return SubmitResult::AbortedAfterRetries {
                            attempts: attempt,
                            reason: "blocking prompt could not be dismissed".to_string(),
                        };
                    }
                    if attempt == self.max_attempts {
                        return SubmitResult::AbortedAfterRetries {
                            attempts: attempt,
                            reason: "blocking prompt on final attempt".to_string(),
                        };
                    }
                    let wait = self.backoff(attempt);
                    debug!(task = %task.id, attempt, ?wait, "Prompt dismissed, backing off");
                    sleep(wait).await;
                }
                SubmitOutcome::Failed(reason) => {
                    if attempt == self.max_attempts {
                        return SubmitResult::AbortedAfterRetries {
                            attempts: attempt,
                            reason,
                        };
                    }
                    let wait = self.backoff(attempt);
                    debug!(task = %task.id, attempt, %reason, ?wait, "Attempt failed, backing off");
                    sleep(wait).await;
                }
            }
        }

        // max_attempts >= 1 is enforced by configuration validation
        SubmitResult::AbortedAfterRetries {
            attempts: 0,
            reason: "no attempts were made".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverError;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Session scripted with a fixed sequence of submit outcomes
    struct ScriptedSession {
        script: Vec<SubmitOutcome>,
        submits: usize,
        dismiss_succeeds: bool,
        dismissals: Arc<Mutex<usize>>,
    }

    impl ScriptedSession {
        fn new(script: Vec<SubmitOutcome>) -> Self {
            Self {
                script,
                submits: 0,
                dismiss_succeeds: true,
                dismissals: Arc::new(Mutex::new(0)),
            }
        }
    }

    #[async_trait]
    impl Session for ScriptedSession {
        async fn begin_upload(&mut self, _task: &Task) -> Result<(), DriverError> {
            Ok(())
        }

        async fn submit(&mut self, _task: &Task) -> SubmitOutcome {
            let outcome = self
                .script
                .get(self.submits)
                .cloned()
                .unwrap_or(SubmitOutcome::Submitted);
            self.submits += 1;
            outcome
        }

        async fn dismiss_prompt(&mut self) -> bool {
            *self.dismissals.lock().unwrap() += 1;
            self.dismiss_succeeds
        }

        async fn close(self: Box<Self>) {}
    }

    fn task() -> Task {
        Task::new(
            PathBuf::from("/uploads/a.zip"),
            1024,
            String::new(),
            String::new(),
        )
    }

    fn engine() -> RetryEngine {
        RetryEngine::new(3, Duration::from_secs(10), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let mut session = ScriptedSession::new(vec![SubmitOutcome::Submitted]);
        let result = engine().drive(&mut session, &task()).await;
        assert_eq!(result, SubmitResult::Succeeded { attempts: 1 });
        assert_eq!(session.submits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success_with_linear_backoff() {
        let mut session = ScriptedSession::new(vec![
            SubmitOutcome::Failed("redirect missing".to_string()),
            SubmitOutcome::Failed("redirect missing".to_string()),
            SubmitOutcome::Submitted,
        ]);

        let start = Instant::now();
        let result = engine().drive(&mut session, &task()).await;

        assert_eq!(result, SubmitResult::Succeeded { attempts: 3 });
        assert_eq!(session.submits, 3);
        // Backoffs of 10s then 20s between the three attempts
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_abort() {
        let mut session = ScriptedSession::new(vec![
            SubmitOutcome::Failed("e1".to_string()),
            SubmitOutcome::Failed("e2".to_string()),
            SubmitOutcome::Failed("e3".to_string()),
        ]);

        let result = engine().drive(&mut session, &task()).await;
        assert_eq!(
            result,
            SubmitResult::AbortedAfterRetries {
                attempts: 3,
                reason: "e3".to_string(),
            }
        );
        // Attempt budget is a hard bound
        assert_eq!(session.submits, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismissed_prompt_consumes_an_attempt() {
        let mut session = ScriptedSession::new(vec![
            SubmitOutcome::RecoverablePrompt,
            SubmitOutcome::Submitted,
        ]);

        let result = engine().drive(&mut session, &task()).await;
        assert_eq!(result, SubmitResult::Succeeded { attempts: 2 });
        assert_eq!(*session.dismissals.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_dismissal_skips_remaining_attempts() {
        let mut session = ScriptedSession::new(vec![
            SubmitOutcome::RecoverablePrompt,
            SubmitOutcome::Submitted,
        ]);
        session.dismiss_succeeds = false;

        let result = engine().drive(&mut session, &task()).await;
        assert!(matches!(
            result,
            SubmitResult::AbortedAfterRetries { attempts: 1, .. }
        ));
        assert_eq!(session.submits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_on_final_attempt_aborts() {
        let mut session = ScriptedSession::new(vec![
            SubmitOutcome::Failed("e1".to_string()),
            SubmitOutcome::Failed("e2".to_string()),
            SubmitOutcome::RecoverablePrompt,
        ]);

        let result = engine().drive(&mut session, &task()).await;
        assert!(matches!(
            result,
            SubmitResult::AbortedAfterRetries { attempts: 3, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_submit_counts_as_a_failed_attempt() {
        struct HungSession;

        #[async_trait]
        impl Session for HungSession {
            async fn begin_upload(&mut self, _task: &Task) -> Result<(), DriverError> {
                Ok(())
            }
            async fn submit(&mut self, _task: &Task) -> SubmitOutcome {
                sleep(Duration::from_secs(3600)).await;
                SubmitOutcome::Submitted
            }
            async fn dismiss_prompt(&mut self) -> bool {
                true
            }
            async fn close(self: Box<Self>) {}
        }

        let engine = RetryEngine::new(2, Duration::from_secs(10), Duration::from_secs(30));
        let mut session = HungSession;
        let result = engine.drive(&mut session, &task()).await;
        assert!(matches!(
            result,
            SubmitResult::AbortedAfterRetries { attempts: 2, .. }
        ));
    }
}
