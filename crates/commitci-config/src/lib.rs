//! KDL configuration parsing for commitci.
//!
//! This crate handles parsing of:
//! - System configuration (commitci.kdl)
//! - The scheduling-system endpoint
//! - Variable interpolation for job names, repository URLs and commands

pub mod error;
pub mod system;
pub mod variables;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    BuildServiceConfig, JobNameConfig, SchedulerConfig, SchedulerEndpoint, SystemConfig,
    load_system_config, parse_system_config,
};
pub use variables::{VariableContext, VariableContextBuilder};
