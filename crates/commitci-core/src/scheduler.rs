//! Job-scheduling system trait.
//!
//! The scheduling system runs two kinds of jobs for a component: one
//! dispatcher job that fires on every push to any branch, and one worker job
//! per branch that performs the checkout-and-build sequence.

use async_trait::async_trait;

use crate::{CommitDescriptor, PlatformSource, Result};

/// Trait for job-scheduling backends.
///
/// Every mutating operation must be idempotent or no-op-safe on repeat.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Name of this scheduling backend.
    fn name(&self) -> &'static str;

    /// Whether the scheduling system knows a node (slave) by this name.
    async fn node_exists(&self, slave: &str) -> Result<bool>;

    /// Create the component's dispatcher job, or re-apply its configuration.
    async fn ensure_dispatcher_job(
        &self,
        component: &str,
        slave: &str,
        platform: &PlatformSource,
    ) -> Result<()>;

    /// Remove the component's dispatcher job. Absent jobs are not an error.
    async fn remove_dispatcher_job(&self, component: &str) -> Result<()>;

    /// Create the worker job for `(component, branch)` if it does not exist.
    ///
    /// Must be safe under concurrent calls for the same pair.
    async fn ensure_worker_job(
        &self,
        component: &str,
        branch: &str,
        slave: &str,
        platform: &PlatformSource,
    ) -> Result<()>;

    /// Queue a run of the worker job for `(component, branch)`.
    async fn trigger_worker_job(
        &self,
        component: &str,
        branch: &str,
        commit: &CommitDescriptor,
        staging: bool,
    ) -> Result<()>;
}
