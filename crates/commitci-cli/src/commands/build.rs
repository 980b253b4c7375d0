//! The `build` command run by worker jobs.

use anyhow::{Context, Result};
use commitci_backends::{CommandBuildService, FileMappingStore, GitVersionControl};
use commitci_config::SystemConfig;
use commitci_core::{BuildTarget, CommitDescriptor, Error};
use commitci_scheduler::{BuildOutcome, NotificationBuilder, Worker};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use super::{CommitArgs, Globals};

pub async fn build(
    globals: &Globals,
    component: &str,
    commit: &CommitArgs,
    staging: bool,
    report: Option<PathBuf>,
) -> Result<()> {
    let config = match globals.system_config() {
        Ok(config) => config,
        Err(e) => return abort(component, commit, staging, &[], report.as_deref(), e).await,
    };
    let targets = config.targets_for(staging);

    let (descriptor, worker) = match prepare(component, commit, &config) {
        Ok(prepared) => prepared,
        Err(e) => return abort(component, commit, staging, targets, report.as_deref(), e).await,
    };
    let worker = match report {
        Some(report) => worker.with_report(report),
        None => worker,
    };

    match worker.build(&descriptor, staging).await {
        Ok(outcome) => {
            println!("{}", outcome.notification);
            check_outcome(&outcome, component, &descriptor.branch)
        }
        Err(e) => {
            // The worker has already written the report.
            let notification =
                NotificationBuilder::new(component, &descriptor, staging).from_failure(&e, targets);
            println!("{}", notification);
            Err(e).with_context(|| {
                format!("Build run aborted for {} {}", component, descriptor.branch)
            })
        }
    }
}

fn prepare(
    component: &str,
    commit: &CommitArgs,
    config: &SystemConfig,
) -> commitci_core::Result<(CommitDescriptor, Worker)> {
    let descriptor = commit.descriptor()?;
    let builds = CommandBuildService::new(config.build_service.clone())?;
    let worker = Worker::new(
        component,
        config,
        Arc::new(GitVersionControl::new()),
        Arc::new(builds),
        Arc::new(FileMappingStore::new(&config.mapping_store)),
    );
    Ok((descriptor, worker))
}

/// Report a failure that happened before any build started.
async fn abort(
    component: &str,
    commit: &CommitArgs,
    staging: bool,
    targets: &[BuildTarget],
    report: Option<&Path>,
    error: Error,
) -> Result<()> {
    let commit = commit.reported();
    let notification =
        NotificationBuilder::new(component, &commit, staging).from_failure(&error, targets);
    println!("{}", notification);
    if let Some(path) = report {
        if let Err(report_err) = notification.write_to(path).await {
            warn!(error = %report_err, "Could not write error report");
        }
    }
    Err(error).with_context(|| format!("Build run aborted for {} {}", component, commit.branch))
}

/// A run whose builds did not all succeed exits non-zero.
fn check_outcome(outcome: &BuildOutcome, component: &str, branch: &str) -> Result<()> {
    if !outcome.success {
        anyhow::bail!("Build failed for {} {}", component, branch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use commitci_core::RunId;
    use commitci_scheduler::Notification;

    fn commit_args(branch: &str) -> CommitArgs {
        CommitArgs {
            branch: branch.to_string(),
            hash: Some("abc123".to_string()),
            description: None,
        }
    }

    fn outcome(success: bool) -> BuildOutcome {
        BuildOutcome {
            run_id: RunId::new(),
            success,
            notification: Notification {
                header: if success { "BuildSucceeded" } else { "BuildFailed" }.to_string(),
                body: String::new(),
            },
        }
    }

    #[test]
    fn test_successful_outcome_exits_zero() {
        assert!(check_outcome(&outcome(true), "demo", "main").is_ok());
    }

    #[test]
    fn test_failed_outcome_exits_non_zero() {
        let err = check_outcome(&outcome(false), "demo", "main").unwrap_err();
        assert_eq!(err.to_string(), "Build failed for demo main");
    }

    #[tokio::test]
    async fn test_missing_config_writes_error_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("report.txt");
        let globals = Globals {
            config: Some(dir.path().join("absent.kdl")),
            scheduler_url: None,
            checkout_root: None,
        };

        let err = build(&globals, "demo", &commit_args("main"), false, Some(report.clone()))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Configuration(_))
        ));
        let written = std::fs::read_to_string(&report).unwrap();
        assert!(written.starts_with("ConfigurationError\n"));
        assert!(written.contains("absent.kdl"));
        assert!(written.contains("Branch: main"));
    }

    #[tokio::test]
    async fn test_invalid_branch_writes_error_report() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("commitci.kdl");
        std::fs::write(&config, "targets \"fedora\" \"rhel\"\n").unwrap();
        let report = dir.path().join("report.txt");
        let globals = Globals {
            config: Some(config),
            scheduler_url: None,
            checkout_root: None,
        };

        let err = build(&globals, "demo", &commit_args(" "), false, Some(report.clone()))
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<Error>().is_some());
        let written = std::fs::read_to_string(&report).unwrap();
        assert!(written.starts_with("ConfigurationError\n"));
        assert!(written.contains("Targets: fedora, rhel"));
    }
}
