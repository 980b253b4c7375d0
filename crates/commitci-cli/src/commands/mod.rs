//! CLI command implementations.

pub mod build;
pub mod dispatch;

use anyhow::{Context, Result};
use clap::Args;
use commitci_config::{SystemConfig, load_system_config};
use commitci_core::{CommitDescriptor, Error, PlatformSource};
use std::path::{Path, PathBuf};

/// Options shared by every command.
pub struct Globals {
    pub config: Option<PathBuf>,
    pub scheduler_url: Option<String>,
    pub checkout_root: Option<PathBuf>,
}

impl Globals {
    pub fn system_config(&self) -> commitci_core::Result<SystemConfig> {
        let mut config = load_system_config(self.config.as_deref()).map_err(|e| match &self.config {
            Some(path) => Error::Configuration(format!(
                "failed to load configuration {}: {}",
                path.display(),
                e
            )),
            None => Error::from(e),
        })?;
        if let Some(root) = &self.checkout_root {
            config.checkout_root = root.clone();
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct PlatformArgs {
    /// Account owning the platform repository fork
    #[arg(long)]
    pub platform_account: String,
    /// Branch of the platform repository
    #[arg(long)]
    pub platform_branch: String,
}

impl From<&PlatformArgs> for PlatformSource {
    fn from(args: &PlatformArgs) -> Self {
        PlatformSource::new(&args.platform_account, &args.platform_branch)
    }
}

#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Branch that received the push
    #[arg(long)]
    pub branch: String,
    /// Commit hash, if known
    #[arg(long)]
    pub hash: Option<String>,
    /// Commit description, if known
    #[arg(long)]
    pub description: Option<String>,
}

impl CommitArgs {
    pub fn descriptor(&self) -> commitci_core::Result<CommitDescriptor> {
        CommitDescriptor::new(&self.branch, self.hash.clone(), self.description.clone())
    }

    /// The commit as given on the command line, valid or not, for reporting.
    pub fn reported(&self) -> CommitDescriptor {
        self.descriptor().unwrap_or_else(|_| CommitDescriptor {
            hash: self.hash.clone(),
            branch: self.branch.clone(),
            description: self.description.clone(),
        })
    }
}

pub fn validate(path: &Path) -> Result<()> {
    let config = load_system_config(Some(path))
        .with_context(|| format!("Invalid configuration: {}", path.display()))?;

    let names = |targets: &[commitci_core::BuildTarget]| {
        targets
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!("Configuration is valid: {}", path.display());
    println!("  targets:         {}", names(&config.targets));
    if !config.staging_targets.is_empty() {
        println!("  staging targets: {}", names(&config.staging_targets));
    }
    println!("  staging marker:  {}", config.staging_config);
    println!("  checkout root:   {}", config.checkout_root.display());
    println!("  mapping store:   {}", config.mapping_store.display());
    println!(
        "  jobs:            {} / {}",
        config.jobs.dispatcher_job("<component>"),
        config.jobs.worker_job("<component>", "<branch>")
    );
    println!("  build service:   {}", config.build_service.program);
    Ok(())
}
