//! System configuration parsing.

use crate::{ConfigError, ConfigResult, VariableContextBuilder};
use commitci_core::BuildTarget;
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable holding the scheduling system's location.
pub const SCHEDULER_URL_ENV: &str = "COMMITCI_SCHEDULER_URL";

/// System-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Targets built for an ordinary branch.
    pub targets: Vec<BuildTarget>,
    /// Targets built for a staging branch. Empty means "same as `targets`".
    pub staging_targets: Vec<BuildTarget>,
    /// Marker file whose presence flags a branch as staging.
    pub staging_config: String,
    /// Directory holding one checkout per component.
    pub checkout_root: PathBuf,
    /// Clone URL template for a component repository.
    pub repository: String,
    /// Clone URL template for the orchestration support code.
    pub platform_repository: String,
    /// JSON Lines file receiving committer records.
    pub mapping_store: PathBuf,
    pub jobs: JobNameConfig,
    pub scheduler: SchedulerConfig,
    pub build_service: BuildServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobNameConfig {
    pub dispatcher: String,
    pub worker: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub user: Option<String>,
    /// Name of the environment variable holding the API token.
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildServiceConfig {
    pub program: String,
    pub submit_args: Vec<String>,
    pub status_args: Vec<String>,
    pub task_id_pattern: String,
    pub poll_interval: Duration,
    pub deadline: Duration,
    pub max_poll_failures: u32,
    pub command_timeout: Duration,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            staging_targets: Vec::new(),
            staging_config: ".commitci-staging".to_string(),
            checkout_root: PathBuf::from("."),
            repository: "https://src.fedoraproject.org/rpms/${component}.git".to_string(),
            platform_repository: "https://github.com/${account}/commitci-platform.git"
                .to_string(),
            mapping_store: PathBuf::from("committers.jsonl"),
            jobs: JobNameConfig::default(),
            scheduler: SchedulerConfig::default(),
            build_service: BuildServiceConfig::default(),
        }
    }
}

impl Default for JobNameConfig {
    fn default() -> Self {
        Self {
            dispatcher: "${component}-commit-ci".to_string(),
            worker: "${component}-${branch}-commit-ci".to_string(),
        }
    }
}

impl Default for BuildServiceConfig {
    fn default() -> Self {
        Self {
            program: "koji".to_string(),
            submit_args: ["build", "--scratch", "--nowait", "${target}", "."]
                .map(String::from)
                .to_vec(),
            status_args: ["taskinfo", "${task_id}"].map(String::from).to_vec(),
            task_id_pattern: r"Created task:\s*(\d+)".to_string(),
            poll_interval: Duration::from_secs(30),
            deadline: Duration::from_secs(4 * 60 * 60),
            max_poll_failures: 5,
            command_timeout: Duration::from_secs(120),
        }
    }
}

impl SystemConfig {
    /// Targets for a run, honouring the staging override.
    pub fn targets_for(&self, staging: bool) -> &[BuildTarget] {
        if staging && !self.staging_targets.is_empty() {
            &self.staging_targets
        } else {
            &self.targets
        }
    }

    /// Local checkout of a component.
    pub fn component_dir(&self, component: &str) -> PathBuf {
        self.checkout_root.join(component)
    }

    pub fn repository_url(&self, component: &str) -> String {
        VariableContextBuilder::new()
            .with_component(component)
            .build()
            .interpolate(&self.repository)
    }

    pub fn platform_repository_url(&self, account: &str) -> String {
        VariableContextBuilder::new()
            .with_platform(account, "")
            .build()
            .interpolate(&self.platform_repository)
    }
}

impl JobNameConfig {
    pub fn dispatcher_job(&self, component: &str) -> String {
        VariableContextBuilder::new()
            .with_component(sanitize_job_segment(component))
            .build()
            .interpolate(&self.dispatcher)
    }

    pub fn worker_job(&self, component: &str, branch: &str) -> String {
        VariableContextBuilder::new()
            .with_component(sanitize_job_segment(component))
            .with_branch(branch_job_segment(branch))
            .build()
            .interpolate(&self.worker)
    }
}

/// Job names end up in URLs; branch names like `feature/x` must not.
fn sanitize_job_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Sanitised branch name, suffixed with a digest of the raw name whenever
/// sanitising changed it, so `feature/x` and `feature-x` get distinct jobs.
fn branch_job_segment(branch: &str) -> String {
    let segment = sanitize_job_segment(branch);
    if segment == branch {
        return segment;
    }
    let digest = hex::encode(Sha256::digest(branch.as_bytes()));
    format!("{}-{}", segment, &digest[..8])
}

/// Location of the job-scheduling system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerEndpoint(Url);

impl SchedulerEndpoint {
    /// Parse the endpoint from the value of `COMMITCI_SCHEDULER_URL`.
    pub fn from_value(value: Option<&str>) -> ConfigResult<Self> {
        let value = value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingField(SCHEDULER_URL_ENV.to_string()))?;
        let mut url = Url::parse(value).map_err(|e| ConfigError::InvalidValue {
            field: SCHEDULER_URL_ENV.to_string(),
            message: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue {
                field: SCHEDULER_URL_ENV.to_string(),
                message: format!("not a base URL: {}", value),
            });
        }
        // Joining relative paths onto the endpoint needs a trailing slash.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self(url))
    }

    pub fn url(&self) -> &Url {
        &self.0
    }
}

impl std::fmt::Display for SchedulerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Load system configuration from a file, or defaults when no path is given.
pub fn load_system_config(path: Option<&Path>) -> ConfigResult<SystemConfig> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            parse_system_config(&content)
        }
        None => Ok(SystemConfig::default()),
    }
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "targets" => {
                config.targets = parse_targets(node, "targets")?;
            }
            "staging-targets" => {
                config.staging_targets = parse_targets(node, "staging-targets")?;
            }
            "staging-config" => {
                config.staging_config = require_string(node, "staging-config")?;
            }
            "checkout-root" => {
                config.checkout_root = PathBuf::from(require_string(node, "checkout-root")?);
            }
            "repository" => {
                config.repository = require_string(node, "repository")?;
            }
            "platform-repository" => {
                config.platform_repository = require_string(node, "platform-repository")?;
            }
            "mapping-store" => {
                config.mapping_store = PathBuf::from(require_string(node, "mapping-store")?);
            }
            "jobs" => {
                parse_jobs(node, &mut config.jobs)?;
            }
            "scheduler" => {
                parse_scheduler(node, &mut config.scheduler);
            }
            "build-service" => {
                parse_build_service(node, &mut config.build_service)?;
            }
            _ => {} // Ignore unknown nodes
        }
    }

    if config.staging_config.contains('/') || config.staging_config.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "staging-config".to_string(),
            message: "must be a plain file name".to_string(),
        });
    }

    if !config.jobs.worker.contains("${branch}") {
        return Err(ConfigError::InvalidValue {
            field: "jobs.worker".to_string(),
            message: "worker job name must contain ${branch}".to_string(),
        });
    }

    Ok(config)
}

fn parse_targets(node: &KdlNode, field: &str) -> ConfigResult<Vec<BuildTarget>> {
    let names = get_all_string_args(node);
    if names.is_empty() {
        return Err(ConfigError::MissingField(format!("{} values", field)));
    }
    names
        .into_iter()
        .map(|name| {
            BuildTarget::new(name).map_err(|e| ConfigError::InvalidValue {
                field: field.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn parse_jobs(node: &KdlNode, jobs: &mut JobNameConfig) -> ConfigResult<()> {
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "dispatcher" => jobs.dispatcher = require_string(child, "jobs.dispatcher")?,
                "worker" => jobs.worker = require_string(child, "jobs.worker")?,
                _ => {}
            }
        }
    }
    Ok(())
}

fn parse_scheduler(node: &KdlNode, scheduler: &mut SchedulerConfig) {
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "user" => scheduler.user = get_first_string_arg(child),
                "token-env" => scheduler.token_env = get_first_string_arg(child),
                _ => {}
            }
        }
    }
}

fn parse_build_service(node: &KdlNode, service: &mut BuildServiceConfig) -> ConfigResult<()> {
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "program" => {
                    service.program = require_string(child, "build-service.program")?;
                }
                "submit-args" => {
                    service.submit_args = get_all_string_args(child);
                }
                "status-args" => {
                    service.status_args = get_all_string_args(child);
                }
                "task-id-pattern" => {
                    let pattern = require_string(child, "build-service.task-id-pattern")?;
                    let re = regex::Regex::new(&pattern).map_err(|e| {
                        ConfigError::InvalidValue {
                            field: "build-service.task-id-pattern".to_string(),
                            message: e.to_string(),
                        }
                    })?;
                    if re.captures_len() < 2 {
                        return Err(ConfigError::InvalidValue {
                            field: "build-service.task-id-pattern".to_string(),
                            message: "pattern needs a capture group for the task id".to_string(),
                        });
                    }
                    service.task_id_pattern = pattern;
                }
                "poll-interval-secs" => {
                    service.poll_interval =
                        Duration::from_secs(require_u64(child, "build-service.poll-interval-secs")?);
                }
                "deadline-secs" => {
                    service.deadline =
                        Duration::from_secs(require_u64(child, "build-service.deadline-secs")?);
                }
                "max-poll-failures" => {
                    let value = require_u64(child, "build-service.max-poll-failures")?;
                    service.max_poll_failures =
                        u32::try_from(value).map_err(|_| ConfigError::InvalidValue {
                            field: "build-service.max-poll-failures".to_string(),
                            message: format!("{} is out of range", value),
                        })?;
                }
                "command-timeout-secs" => {
                    service.command_timeout = Duration::from_secs(require_u64(
                        child,
                        "build-service.command-timeout-secs",
                    )?);
                }
                _ => {}
            }
        }
    }

    if service.submit_args.is_empty() || service.status_args.is_empty() {
        return Err(ConfigError::MissingField(
            "build-service submit-args/status-args".to_string(),
        ));
    }
    if service.poll_interval.is_zero() {
        return Err(ConfigError::InvalidValue {
            field: "build-service.poll-interval-secs".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }

    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn require_string(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

fn require_u64(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    let value = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    u64::try_from(value).map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("{} is not a non-negative integer", value),
    })
}
