//! Build targets, attempts and the remote build service trait.
//!
//! A build service compiles scratch builds of a checked-out tree against a
//! named target and reports their progress by task id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result, TaskId};

/// A named build environment/architecture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BuildTarget(String);

impl BuildTarget {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::Configuration("build target name is empty".into()));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(Error::Configuration(format!(
                "build target name contains whitespace: {:?}",
                name
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for BuildTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for BuildTarget {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BuildTarget> for String {
    fn from(target: BuildTarget) -> Self {
        target.0
    }
}

/// Status of a build attempt as reported by the remote build service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    Pending,
    Running,
    Success,
    Failure,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Failure)
    }

    fn rank(&self) -> u8 {
        match self {
            BuildStatus::Pending => 0,
            BuildStatus::Running => 1,
            BuildStatus::Success | BuildStatus::Failure => 2,
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Pending => write!(f, "Pending"),
            BuildStatus::Running => write!(f, "Running"),
            BuildStatus::Success => write!(f, "Success"),
            BuildStatus::Failure => write!(f, "Failure"),
        }
    }
}

/// Why an attempt ended in `Failure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The build service ran the build and it failed.
    BuildFailed,
    /// The build service could not be reached during submission or polling.
    BuildServiceUnavailable(String),
    /// The attempt was still in progress when the wait deadline passed.
    DeadlineExceeded,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::BuildFailed => write!(f, "build failed"),
            FailureReason::BuildServiceUnavailable(msg) => {
                write!(f, "BuildServiceUnavailable: {}", msg)
            }
            FailureReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// One build request against one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildAttempt {
    pub target: BuildTarget,
    /// Assigned once the build service accepts the request.
    pub task_id: Option<TaskId>,
    pub status: BuildStatus,
    pub failure: Option<FailureReason>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildAttempt {
    pub fn new(target: BuildTarget) -> Self {
        Self {
            target,
            task_id: None,
            status: BuildStatus::Pending,
            failure: None,
            submitted_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Success
    }

    /// Record that the build service accepted the request.
    pub fn mark_submitted(&mut self, task_id: TaskId) {
        self.task_id = Some(task_id);
        self.submitted_at = Some(Utc::now());
    }

    /// Apply a polled status. Returns whether the attempt changed.
    ///
    /// Attempts never move backward: a terminal attempt ignores every update
    /// and a running attempt ignores `Pending`.
    pub fn advance(&mut self, status: BuildStatus) -> bool {
        if self.is_terminal() || status.rank() < self.status.rank() || status == self.status {
            return false;
        }
        self.status = status;
        if status == BuildStatus::Failure {
            self.failure.get_or_insert(FailureReason::BuildFailed);
        }
        if status.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }

    /// Terminate the attempt as a failure with a specific reason.
    pub fn fail(&mut self, reason: FailureReason) {
        if self.is_terminal() {
            return;
        }
        self.status = BuildStatus::Failure;
        self.failure = Some(reason);
        self.finished_at = Some(Utc::now());
    }
}

/// Trait for remote build services.
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Name of this build service.
    fn name(&self) -> &'static str;

    /// Submit a scratch build of `working_dir` against `target`.
    ///
    /// Returns as soon as the service has accepted the request. Unreachable
    /// services report `Error::BuildServiceUnavailable`; a refused request
    /// reports `Error::SubmissionRejected`.
    async fn submit(&self, target: &BuildTarget, working_dir: &Path) -> Result<TaskId>;

    /// Current status of a submitted build.
    async fn poll_status(&self, task_id: &TaskId) -> Result<BuildStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt() -> BuildAttempt {
        BuildAttempt::new(BuildTarget::new("fedora").unwrap())
    }

    #[test]
    fn test_target_validation() {
        assert!(BuildTarget::new("fedora-rawhide").is_ok());
        assert!(matches!(
            BuildTarget::new(""),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            BuildTarget::new("bad target"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_target_deserialization_validates() {
        let ok: BuildTarget = serde_json::from_str("\"rhel\"").unwrap();
        assert_eq!(ok.as_str(), "rhel");
        assert!(serde_json::from_str::<BuildTarget>("\"a b\"").is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(BuildStatus::Success.to_string(), "Success");
        assert_eq!(BuildStatus::Failure.to_string(), "Failure");
    }

    #[test]
    fn test_attempt_progresses_forward() {
        let mut a = attempt();
        assert!(a.advance(BuildStatus::Running));
        assert!(a.advance(BuildStatus::Success));
        assert!(a.is_success());
        assert!(a.finished_at.is_some());
    }

    #[test]
    fn test_attempt_never_moves_backward() {
        let mut a = attempt();
        a.advance(BuildStatus::Running);
        assert!(!a.advance(BuildStatus::Pending));
        assert_eq!(a.status, BuildStatus::Running);

        a.advance(BuildStatus::Failure);
        assert!(!a.advance(BuildStatus::Success));
        assert!(!a.advance(BuildStatus::Running));
        assert_eq!(a.status, BuildStatus::Failure);
        assert_eq!(a.failure, Some(FailureReason::BuildFailed));
    }

    #[test]
    fn test_fail_is_sticky() {
        let mut a = attempt();
        a.fail(FailureReason::DeadlineExceeded);
        a.fail(FailureReason::BuildFailed);
        assert_eq!(a.failure, Some(FailureReason::DeadlineExceeded));

        let mut b = attempt();
        b.advance(BuildStatus::Success);
        b.fail(FailureReason::DeadlineExceeded);
        assert!(b.is_success());
        assert!(b.failure.is_none());
    }
}
