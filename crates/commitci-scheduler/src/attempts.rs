//! Concurrent build attempts against a set of targets.

use commitci_config::BuildServiceConfig;
use commitci_core::{
    BuildAttempt, BuildService, BuildTarget, Error, FailureReason, Result, TaskId,
};
use futures::future::{join_all, try_join_all};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, warn};

/// How `wait()` polls the build service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Upper bound on the whole `wait()` call, measured from its start.
    pub deadline: Duration,
    /// Consecutive failed polls after which an attempt is given up on.
    pub max_poll_failures: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&BuildServiceConfig::default())
    }
}

impl PollPolicy {
    pub fn from_config(config: &BuildServiceConfig) -> Self {
        Self {
            interval: config.poll_interval,
            deadline: config.deadline,
            max_poll_failures: config.max_poll_failures,
        }
    }
}

/// One build attempt per target, all issued from the same working directory.
pub struct BuildAttemptSet {
    service: Arc<dyn BuildService>,
    working_dir: PathBuf,
    attempts: Vec<BuildAttempt>,
    policy: PollPolicy,
}

impl BuildAttemptSet {
    /// Attempts keep the order of `targets`.
    pub fn new(
        service: Arc<dyn BuildService>,
        working_dir: impl Into<PathBuf>,
        targets: &[BuildTarget],
        policy: PollPolicy,
    ) -> Self {
        Self {
            service,
            working_dir: working_dir.into(),
            attempts: targets.iter().cloned().map(BuildAttempt::new).collect(),
            policy,
        }
    }

    /// Submit one request per target concurrently.
    ///
    /// Returns once every request has been accepted or has failed because the
    /// build service was unreachable; unreachable submissions fail only their
    /// own attempt. Any other submission error aborts the whole call.
    pub async fn execute(&mut self) -> Result<()> {
        let service = &self.service;
        let working_dir = &self.working_dir;

        info!(
            service = service.name(),
            targets = self.attempts.len(),
            dir = %working_dir.display(),
            "Submitting build attempts"
        );

        let submissions = self.attempts.iter().map(|attempt| async move {
            match service.submit(&attempt.target, working_dir).await {
                Ok(task_id) => Ok(Ok(task_id)),
                Err(Error::BuildServiceUnavailable(message)) => Ok(Err(message)),
                Err(e) => Err(e),
            }
        });
        let outcomes: Vec<std::result::Result<TaskId, String>> =
            try_join_all(submissions).await?;

        for (attempt, outcome) in self.attempts.iter_mut().zip(outcomes) {
            match outcome {
                Ok(task_id) => {
                    info!(target = %attempt.target, task_id = %task_id, "Build attempt submitted");
                    attempt.mark_submitted(task_id);
                }
                Err(message) => {
                    warn!(target = %attempt.target, error = %message, "Build service unavailable, attempt failed");
                    attempt.fail(FailureReason::BuildServiceUnavailable(message));
                }
            }
        }
        Ok(())
    }

    /// Poll every unfinished attempt until it is terminal.
    ///
    /// Never runs past the policy deadline; attempts still unfinished at that
    /// point are failed. Fails only when called before `execute()`.
    pub async fn wait(&mut self) -> Result<()> {
        if let Some(attempt) = self
            .attempts
            .iter()
            .find(|a| !a.is_terminal() && a.task_id.is_none())
        {
            return Err(Error::Internal(format!(
                "attempt for {} was never submitted",
                attempt.target
            )));
        }

        let deadline = Instant::now() + self.policy.deadline;
        let service = self.service.as_ref();
        let policy = &self.policy;

        join_all(
            self.attempts
                .iter_mut()
                .filter(|a| !a.is_terminal())
                .map(|attempt| supervise(service, attempt, policy, deadline)),
        )
        .await;

        info!(
            succeeded = self.successful().count(),
            total = self.attempts.len(),
            "Build attempts finished"
        );
        Ok(())
    }

    /// Vacuously true for an empty set.
    pub fn all_successful(&self) -> bool {
        self.attempts.iter().all(BuildAttempt::is_success)
    }

    /// Attempts in target order.
    pub fn all(&self) -> &[BuildAttempt] {
        &self.attempts
    }

    /// Successful attempts with their task ids.
    pub fn successful(&self) -> impl Iterator<Item = (&BuildTarget, &TaskId)> {
        self.attempts
            .iter()
            .filter(|a| a.is_success())
            .filter_map(|a| a.task_id.as_ref().map(|task_id| (&a.target, task_id)))
    }
}

/// Poll a single submitted attempt until it is terminal or the deadline
/// passes.
async fn supervise(
    service: &dyn BuildService,
    attempt: &mut BuildAttempt,
    policy: &PollPolicy,
    deadline: Instant,
) {
    let Some(task_id) = attempt.task_id.clone() else {
        return;
    };
    let max_failures = policy.max_poll_failures.max(1);
    let mut failures = 0u32;
    let mut last_error: Option<String> = None;

    loop {
        match timeout_at(deadline, service.poll_status(&task_id)).await {
            Err(_) => break,
            Ok(Ok(status)) => {
                failures = 0;
                last_error = None;
                if attempt.advance(status) {
                    debug!(target = %attempt.target, task_id = %task_id, status = %status, "Attempt advanced");
                }
                if attempt.is_terminal() {
                    info!(target = %attempt.target, task_id = %task_id, status = %attempt.status, "Attempt finished");
                    return;
                }
            }
            Ok(Err(e)) => {
                failures += 1;
                warn!(
                    target = %attempt.target,
                    task_id = %task_id,
                    failures,
                    error = %e,
                    "Polling build service failed"
                );
                let message = e.message();
                if failures >= max_failures {
                    attempt.fail(FailureReason::BuildServiceUnavailable(message));
                    return;
                }
                last_error = Some(message);
            }
        }

        if timeout_at(deadline, sleep(policy.interval)).await.is_err() {
            break;
        }
    }

    warn!(target = %attempt.target, task_id = %task_id, "Deadline passed before attempt finished");
    attempt.fail(match last_error {
        Some(message) => FailureReason::BuildServiceUnavailable(message),
        None => FailureReason::DeadlineExceeded,
    });
}
