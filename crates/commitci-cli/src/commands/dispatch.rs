//! Dispatcher commands run by operators and by the dispatcher job.

use anyhow::{Context, Result};
use commitci_backends::JenkinsScheduler;
use commitci_config::SchedulerEndpoint;
use commitci_core::PlatformSource;
use commitci_scheduler::CommitCi;
use std::sync::Arc;

use super::{CommitArgs, Globals, PlatformArgs};

fn dispatcher(globals: &Globals, component: &str) -> Result<CommitCi> {
    let config = globals.system_config()?;
    let endpoint = SchedulerEndpoint::from_value(globals.scheduler_url.as_deref())
        .context("Scheduler endpoint is not usable")?;
    let checkout_root = config.checkout_root.clone();
    let scheduler = JenkinsScheduler::new(endpoint, config)?;
    Ok(CommitCi::new(component, Arc::new(scheduler), checkout_root)?)
}

pub async fn enable(
    globals: &Globals,
    component: &str,
    slave: &str,
    platform: &PlatformArgs,
) -> Result<()> {
    dispatcher(globals, component)?
        .enable(slave, &PlatformSource::from(platform))
        .await
        .with_context(|| format!("Failed to enable {}", component))?;
    println!("Dispatcher enabled for {}", component);
    Ok(())
}

pub async fn disable(globals: &Globals, component: &str) -> Result<()> {
    dispatcher(globals, component)?
        .disable()
        .await
        .with_context(|| format!("Failed to disable {}", component))?;
    println!("Dispatcher disabled for {}", component);
    Ok(())
}

pub async fn consider_build(
    globals: &Globals,
    component: &str,
    commit: &CommitArgs,
    slave: &str,
    platform: &PlatformArgs,
    config_file: Option<&str>,
) -> Result<()> {
    let commit = commit.descriptor()?;
    dispatcher(globals, component)?
        .consider_build(&commit, slave, &PlatformSource::from(platform), config_file)
        .await
        .with_context(|| format!("Failed to dispatch {} {}", component, commit.branch))?;
    Ok(())
}
