//! Variable interpolation for configuration templates.
//!
//! Supports variables like:
//! - `${component}` - Component (package) name
//! - `${branch}` - Branch name
//! - `${account}` - Platform-source account
//! - `${platform_branch}` - Platform-source branch
//! - `${target}` - Build target
//! - `${task_id}` - Build service task id
//! - `${env.VAR_NAME}` - Environment variable
//! - `${date}` - ISO date (YYYY-MM-DD)

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Variable context containing all available variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    pub component: Option<String>,
    pub branch: Option<String>,
    pub account: Option<String>,
    pub platform_branch: Option<String>,
    pub target: Option<String>,
    pub task_id: Option<String>,
    /// Environment variables
    pub env: HashMap<String, String>,
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate environment variables from the current process environment.
    pub fn populate_env(&mut self) {
        for (key, value) in std::env::vars() {
            self.env.insert(key, value);
        }
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["component"] => self.component.clone(),
            ["branch"] => self.branch.clone(),
            ["account"] => self.account.clone(),
            ["platform_branch"] => self.platform_branch.clone(),
            ["target"] => self.target.clone(),
            ["task_id"] => self.task_id.clone(),

            ["env", name] => self.env.get(*name).cloned(),

            ["date"] => Some(chrono::Utc::now().format("%Y-%m-%d").to_string()),

            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    /// Unknown variables are left in place.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// Interpolate variables in a list of strings.
    pub fn interpolate_vec(&self, inputs: &[String]) -> Vec<String> {
        inputs.iter().map(|s| self.interpolate(s)).collect()
    }

    /// Names of the variables in `input` this context cannot resolve.
    pub fn unresolved(&self, input: &str) -> Vec<String> {
        VAR_REGEX
            .captures_iter(input)
            .map(|caps| caps[1].to_string())
            .filter(|name| self.resolve(name).is_none())
            .collect()
    }
}

/// Builder for creating VariableContext.
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: VariableContext::new(),
        }
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.ctx.component = Some(component.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.ctx.branch = Some(branch.into());
        self
    }

    pub fn with_platform(mut self, account: impl Into<String>, branch: impl Into<String>) -> Self {
        self.ctx.account = Some(account.into());
        self.ctx.platform_branch = Some(branch.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.ctx.target = Some(target.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.ctx.task_id = Some(task_id.into());
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

impl Default for VariableContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
