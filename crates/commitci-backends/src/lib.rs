//! Collaborator backends for commitci.
//!
//! Provides implementations of the core collaborator traits:
//! - Jenkins (job scheduling)
//! - Koji-style command line (remote build service)
//! - Git (version control)
//! - JSON Lines file (committer mapping store)

pub mod build_service;
pub mod git;
pub mod jenkins;
pub mod mapping;
mod process;

pub use build_service::CommandBuildService;
pub use git::GitVersionControl;
pub use jenkins::JenkinsScheduler;
pub use mapping::FileMappingStore;
