//! Notifications describing the outcome of a worker run.

use askama::Template;
use commitci_core::{BuildAttempt, BuildTarget, CommitDescriptor, Error, Result};
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::attempts::BuildAttemptSet;

pub const SUCCESS_HEADER: &str = "BuildSucceeded";
pub const FAILURE_HEADER: &str = "BuildFailed";
pub const UNEXPECTED_HEADER: &str = "UnexpectedError";

/// Rendered message for whoever watches a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub header: String,
    pub body: String,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        writeln!(f)?;
        write!(f, "{}", self.body)
    }
}

impl Notification {
    /// Write the notification as a report file, creating parent directories.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, format!("{}\n", self)).await?;
        info!(path = %path.display(), header = %self.header, "Report written");
        Ok(())
    }
}

struct AttemptLine {
    target: String,
    status: String,
    detail: String,
}

impl From<&BuildAttempt> for AttemptLine {
    fn from(attempt: &BuildAttempt) -> Self {
        let mut detail = String::new();
        if let Some(task_id) = &attempt.task_id {
            detail.push_str(&format!(" (task {})", task_id));
        }
        if let Some(reason) = &attempt.failure {
            detail.push_str(&format!(": {}", reason));
        }
        Self {
            target: attempt.target.to_string(),
            status: attempt.status.to_string(),
            detail,
        }
    }
}

#[derive(Template)]
#[template(path = "notification/build.txt")]
struct BuildBody<'a> {
    component: &'a str,
    branch: &'a str,
    hash: Option<&'a str>,
    description: Option<&'a str>,
    staging: bool,
    summary: String,
    lines: Vec<AttemptLine>,
}

#[derive(Template)]
#[template(path = "notification/error.txt")]
struct ErrorBody<'a> {
    message: &'a str,
    component: &'a str,
    branch: &'a str,
    hash: Option<&'a str>,
    staging: bool,
    targets: Vec<String>,
}

/// Builds notifications scoped to one component, commit and staging flag.
pub struct NotificationBuilder<'a> {
    component: &'a str,
    commit: &'a CommitDescriptor,
    staging: bool,
}

impl<'a> NotificationBuilder<'a> {
    pub fn new(component: &'a str, commit: &'a CommitDescriptor, staging: bool) -> Self {
        Self {
            component,
            commit,
            staging,
        }
    }

    /// One line per target; the header reflects the aggregate outcome.
    pub fn from_build_attempts(&self, set: &BuildAttemptSet) -> Notification {
        let attempts = set.all();
        let succeeded = attempts.iter().filter(|a| a.is_success()).count();
        let (header, summary) = if set.all_successful() {
            (
                SUCCESS_HEADER,
                format!("All {} scratch builds succeeded.", attempts.len()),
            )
        } else {
            (
                FAILURE_HEADER,
                format!(
                    "{} of {} scratch builds succeeded.",
                    succeeded,
                    attempts.len()
                ),
            )
        };

        let body = BuildBody {
            component: self.component,
            branch: &self.commit.branch,
            hash: self.commit.hash.as_deref(),
            description: self.commit.description.as_deref(),
            staging: self.staging,
            summary,
            lines: attempts.iter().map(AttemptLine::from).collect(),
        };
        self.finish(header, body.render())
    }

    /// Explain an error of class `header` caused by `message`.
    pub fn from_error(&self, header: &str, message: &str, targets: &[BuildTarget]) -> Notification {
        let body = ErrorBody {
            message,
            component: self.component,
            branch: &self.commit.branch,
            hash: self.commit.hash.as_deref(),
            staging: self.staging,
            targets: targets.iter().map(ToString::to_string).collect(),
        };
        self.finish(header, body.render())
    }

    /// Classified errors get their class as header; anything else is reported
    /// as unexpected with its raw text.
    pub fn from_failure(&self, error: &Error, targets: &[BuildTarget]) -> Notification {
        match error.class() {
            Some(class) => self.from_error(class, &error.message(), targets),
            None => self.from_error(UNEXPECTED_HEADER, &error.to_string(), targets),
        }
    }

    fn finish(&self, header: &str, body: askama::Result<String>) -> Notification {
        // Render failures still yield a notification under the same header.
        let body = body.unwrap_or_else(|e| {
            format!(
                "{} {}: notification template failed: {}",
                self.component, self.commit.branch, e
            )
        });
        Notification {
            header: header.to_string(),
            body,
        }
    }
}
