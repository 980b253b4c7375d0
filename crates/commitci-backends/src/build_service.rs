//! Remote build service driven through a Koji-style command line client.

use async_trait::async_trait;
use commitci_config::{BuildServiceConfig, VariableContext, VariableContextBuilder};
use commitci_core::{BuildService, BuildStatus, BuildTarget, Error, Result, TaskId};
use regex::Regex;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::process::{self, CommandError, CommandOutput};

/// Messages a client prints when it cannot talk to the hub at all.
const UNREACHABLE_MARKERS: &[&str] = &[
    "connection refused",
    "connection error",
    "connection reset",
    "could not resolve host",
    "name or service not known",
    "temporary failure in name resolution",
    "network is unreachable",
    "timed out",
    "serveroffline",
    "service unavailable",
];

/// Build service that shells out to a client such as `koji`.
pub struct CommandBuildService {
    config: BuildServiceConfig,
    task_id_regex: Regex,
}

impl CommandBuildService {
    pub fn new(config: BuildServiceConfig) -> Result<Self> {
        let task_id_regex = Regex::new(&config.task_id_pattern).map_err(|e| {
            Error::Configuration(format!("invalid task id pattern: {}", e))
        })?;
        Ok(Self {
            config,
            task_id_regex,
        })
    }

    fn parse_task_id(&self, output: &CommandOutput) -> Option<TaskId> {
        self.task_id_regex
            .captures(&output.stdout)
            .or_else(|| self.task_id_regex.captures(&output.stderr))
            .and_then(|caps| caps.get(1))
            .map(|m| TaskId::new(m.as_str()))
    }

    fn unavailable(err: CommandError) -> Error {
        Error::BuildServiceUnavailable(err.to_string())
    }
}

fn looks_unreachable(output: &CommandOutput) -> bool {
    let text = format!("{}\n{}", output.stderr, output.stdout).to_lowercase();
    UNREACHABLE_MARKERS.iter().any(|marker| text.contains(marker))
}

fn failure_text(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        format!(
            "exit code {}: {}",
            output.exit_code.map_or("unknown".to_string(), |c| c.to_string()),
            output.stdout.trim()
        )
    } else {
        stderr.to_string()
    }
}

/// Interpolate argument templates; `${env.NAME}` reads the process environment.
fn render_args(templates: &[String], mut ctx: VariableContext) -> Result<Vec<String>> {
    ctx.populate_env();
    if let Some(name) = templates.iter().flat_map(|t| ctx.unresolved(t)).next() {
        return Err(Error::Configuration(format!(
            "unknown variable ${{{}}} in build service arguments",
            name
        )));
    }
    Ok(ctx.interpolate_vec(templates))
}

/// Map the `State:` line of a task description to a build status.
fn parse_task_state(stdout: &str) -> Option<BuildStatus> {
    let state = stdout.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case("state")
            .then(|| value.trim().to_lowercase())
    })?;

    match state.as_str() {
        "free" | "assigned" => Some(BuildStatus::Pending),
        "open" => Some(BuildStatus::Running),
        "closed" => Some(BuildStatus::Success),
        "failed" | "canceled" | "cancelled" => Some(BuildStatus::Failure),
        _ => None,
    }
}

#[async_trait]
impl BuildService for CommandBuildService {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn submit(&self, target: &BuildTarget, working_dir: &Path) -> Result<TaskId> {
        let args = render_args(
            &self.config.submit_args,
            VariableContextBuilder::new()
                .with_target(target.as_str())
                .build(),
        )?;

        info!(target = %target, dir = %working_dir.display(), "Submitting scratch build");

        let output = process::run(
            &self.config.program,
            &args,
            Some(working_dir),
            self.config.command_timeout,
        )
        .await
        .map_err(Self::unavailable)?;

        if !output.success {
            if looks_unreachable(&output) {
                warn!(target = %target, "Build service unreachable during submission");
                return Err(Error::BuildServiceUnavailable(failure_text(&output)));
            }
            return Err(Error::SubmissionRejected(format!(
                "{}: {}",
                target,
                failure_text(&output)
            )));
        }

        let task_id = self.parse_task_id(&output).ok_or_else(|| {
            Error::SubmissionRejected(format!(
                "{}: no task id in build service output",
                target
            ))
        })?;

        info!(target = %target, task_id = %task_id, "Scratch build accepted");
        Ok(task_id)
    }

    async fn poll_status(&self, task_id: &TaskId) -> Result<BuildStatus> {
        let args = render_args(
            &self.config.status_args,
            VariableContextBuilder::new()
                .with_task_id(task_id.as_str())
                .build(),
        )?;

        let output = process::run(&self.config.program, &args, None, self.config.command_timeout)
            .await
            .map_err(Self::unavailable)?;

        if !output.success {
            return Err(Error::BuildServiceUnavailable(failure_text(&output)));
        }

        let status = parse_task_state(&output.stdout).ok_or_else(|| {
            Error::Internal(format!("no task state in output for task {}", task_id))
        })?;
        debug!(task_id = %task_id, status = %status, "Polled task");
        Ok(status)
    }
}
