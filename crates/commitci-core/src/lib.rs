//! Core domain types and traits for commitci, a build-on-push CI orchestrator.
//!
//! This crate contains:
//! - Identifiers (task ids, run ids)
//! - The commit and platform-source values a push carries
//! - Build targets, attempts and the remote build service trait
//! - The job-scheduling, version-control and mapping-store traits
//! - The error taxonomy shared by every crate

pub mod build;
pub mod commit;
pub mod error;
pub mod id;
pub mod mapping;
pub mod scheduler;
pub mod vcs;

pub use build::{BuildAttempt, BuildService, BuildStatus, BuildTarget, FailureReason};
pub use commit::{CommitDescriptor, PlatformSource};
pub use error::{Error, Result};
pub use id::{RunId, TaskId};
pub use mapping::{CommitterRecord, MappingStore};
pub use scheduler::JobScheduler;
pub use vcs::VersionControl;
