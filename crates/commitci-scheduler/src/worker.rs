//! The per-branch build run executed by a worker job.

use commitci_config::SystemConfig;
use commitci_core::{
    BuildService, BuildTarget, CommitDescriptor, Error, MappingStore, Result, RunId,
    VersionControl,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::attempts::{BuildAttemptSet, PollPolicy};
use crate::committer::CommitterMapping;
use crate::notification::{Notification, NotificationBuilder};

/// Result of a worker run that got as far as waiting for its builds.
#[derive(Debug)]
pub struct BuildOutcome {
    pub run_id: RunId,
    pub success: bool,
    pub notification: Notification,
}

/// Checks out a component branch and supervises one build per target.
pub struct Worker {
    component: String,
    checkout: PathBuf,
    config: SystemConfig,
    policy: PollPolicy,
    vcs: Arc<dyn VersionControl>,
    builds: Arc<dyn BuildService>,
    committers: CommitterMapping,
    report: Option<PathBuf>,
}

impl Worker {
    pub fn new(
        component: impl Into<String>,
        config: &SystemConfig,
        vcs: Arc<dyn VersionControl>,
        builds: Arc<dyn BuildService>,
        store: Arc<dyn MappingStore>,
    ) -> Self {
        let component = component.into();
        Self {
            committers: CommitterMapping::new(store, component.clone()),
            checkout: config.component_dir(&component),
            component,
            policy: PollPolicy::from_config(&config.build_service),
            config: config.clone(),
            vcs,
            builds,
            report: None,
        }
    }

    /// Write the rendered notification to `path` when the run ends.
    pub fn with_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.report = Some(path.into());
        self
    }

    /// Build `commit` on every configured target.
    ///
    /// Whatever happens, a notification is rendered and the report written
    /// before returning. Orchestration errors are returned after that; a run
    /// whose builds merely failed returns `Ok` with `success == false`.
    pub async fn build(&self, commit: &CommitDescriptor, staging: bool) -> Result<BuildOutcome> {
        let run_id = RunId::new();
        let targets = self.config.targets_for(staging);

        info!(
            run_id = %run_id,
            component = %self.component,
            branch = %commit.branch,
            staging,
            "Starting build run"
        );

        let result = self.run(commit, targets).await;
        self.finish(run_id, commit, staging, targets, result).await
    }

    async fn run(&self, commit: &CommitDescriptor, targets: &[BuildTarget]) -> Result<BuildAttemptSet> {
        if targets.is_empty() {
            return Err(Error::Configuration(format!(
                "no build targets configured for {}",
                self.component
            )));
        }

        let dir = &self.checkout;
        self.vcs
            .checkout(dir, &commit.branch, commit.hash.as_deref())
            .await?;
        self.verify_revision(dir, commit).await?;

        let mut attempts =
            BuildAttemptSet::new(self.builds.clone(), dir.clone(), targets, self.policy);
        attempts.execute().await?;
        attempts.wait().await?;

        self.record_committers(dir, &attempts).await?;
        Ok(attempts)
    }

    /// HEAD must be the pushed commit; `hash` may be abbreviated.
    async fn verify_revision(&self, dir: &Path, commit: &CommitDescriptor) -> Result<()> {
        let head = self
            .vcs
            .head_revision(dir)
            .await
            .map_err(|e| Error::Checkout(e.to_string()))?;
        debug!(branch = %commit.branch, head = %head, "Checked out revision");
        match &commit.hash {
            Some(hash) if !head.starts_with(hash.as_str()) => Err(Error::Checkout(format!(
                "branch '{}' is at {} instead of pushed commit {}",
                commit.branch, head, hash
            ))),
            _ => Ok(()),
        }
    }

    async fn record_committers(&self, dir: &Path, attempts: &BuildAttemptSet) -> Result<()> {
        let mut successful = attempts.successful().peekable();
        if successful.peek().is_none() {
            return Ok(());
        }

        let email = self.vcs.current_commit_author_email(dir).await?;
        for (_, task_id) in successful {
            self.committers.save(task_id, &email).await?;
        }
        Ok(())
    }

    async fn finish(
        &self,
        run_id: RunId,
        commit: &CommitDescriptor,
        staging: bool,
        targets: &[BuildTarget],
        result: Result<BuildAttemptSet>,
    ) -> Result<BuildOutcome> {
        let notifications = NotificationBuilder::new(&self.component, commit, staging);

        match result {
            Ok(attempts) => {
                let success = attempts.all_successful();
                let notification = notifications.from_build_attempts(&attempts);
                if let Some(path) = &self.report {
                    notification.write_to(path).await?;
                }
                info!(run_id = %run_id, success, "Build run finished");
                Ok(BuildOutcome {
                    run_id,
                    success,
                    notification,
                })
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Build run failed");
                let notification = notifications.from_failure(&e, targets);
                if let Some(path) = &self.report {
                    if let Err(report_err) = notification.write_to(path).await {
                        warn!(run_id = %run_id, error = %report_err, "Could not write error report");
                    }
                }
                Err(e)
            }
        }
    }
}
