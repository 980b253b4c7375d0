//! Dispatcher lifecycle for one component.
//!
//! A component is enabled by installing a dispatcher job that watches every
//! branch. On each push the dispatcher job calls [`CommitCi::consider_build`],
//! which lazily creates the per-branch worker job and triggers it.

use commitci_core::{CommitDescriptor, Error, JobScheduler, PlatformSource, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub struct CommitCi {
    component: String,
    scheduler: Arc<dyn JobScheduler>,
    checkout_root: PathBuf,
}

impl CommitCi {
    pub fn new(
        component: impl Into<String>,
        scheduler: Arc<dyn JobScheduler>,
        checkout_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let component = component.into();
        if component.trim().is_empty() || component.contains('/') {
            return Err(Error::Configuration(format!(
                "invalid component name {:?}",
                component
            )));
        }
        Ok(Self {
            component,
            scheduler,
            checkout_root: checkout_root.into(),
        })
    }

    /// Install or refresh the dispatcher job. Safe to repeat.
    pub async fn enable(&self, slave: &str, platform: &PlatformSource) -> Result<()> {
        self.require_node(slave).await?;
        self.scheduler
            .ensure_dispatcher_job(&self.component, slave, platform)
            .await?;
        info!(
            component = %self.component,
            slave = %slave,
            platform_account = %platform.account,
            platform_branch = %platform.branch,
            "Dispatcher enabled"
        );
        Ok(())
    }

    /// Remove the dispatcher job; succeeds when there is none.
    pub async fn disable(&self) -> Result<()> {
        self.scheduler.remove_dispatcher_job(&self.component).await?;
        info!(component = %self.component, "Dispatcher disabled");
        Ok(())
    }

    /// Hand a pushed commit to its branch's worker job.
    ///
    /// The branch counts as staging when `config_file` names a file present
    /// in the component checkout. Returns once the trigger is accepted and
    /// issues no build itself.
    pub async fn consider_build(
        &self,
        commit: &CommitDescriptor,
        slave: &str,
        platform: &PlatformSource,
        config_file: Option<&str>,
    ) -> Result<()> {
        self.require_node(slave).await?;

        let staging = self.staging_requested(config_file);
        debug!(component = %self.component, branch = %commit.branch, staging, "Considering build");

        self.scheduler
            .ensure_worker_job(&self.component, &commit.branch, slave, platform)
            .await?;
        self.scheduler
            .trigger_worker_job(&self.component, &commit.branch, commit, staging)
            .await?;

        info!(
            component = %self.component,
            branch = %commit.branch,
            hash = commit.hash.as_deref().unwrap_or("unknown"),
            staging,
            "Worker triggered"
        );
        Ok(())
    }

    fn component_dir(&self) -> PathBuf {
        self.checkout_root.join(&self.component)
    }

    fn staging_requested(&self, config_file: Option<&str>) -> bool {
        config_file
            .filter(|name| !name.is_empty())
            .is_some_and(|name| marker_present(&self.component_dir(), name))
    }

    async fn require_node(&self, slave: &str) -> Result<()> {
        if self.scheduler.node_exists(slave).await? {
            Ok(())
        } else {
            Err(Error::Configuration(format!(
                "unknown {} node '{}'",
                self.scheduler.name(),
                slave
            )))
        }
    }
}

fn marker_present(dir: &Path, name: &str) -> bool {
    dir.join(name).is_file()
}
