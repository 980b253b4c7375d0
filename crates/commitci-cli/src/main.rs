//! commitci command line.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "commitci")]
#[command(about = "Build-on-push CI orchestrator", long_about = None)]
struct Cli {
    /// System configuration file (defaults apply when omitted)
    #[arg(long, global = true, env = "COMMITCI_CONFIG")]
    config: Option<PathBuf>,

    /// Job scheduling endpoint
    #[arg(long, global = true, env = "COMMITCI_SCHEDULER_URL")]
    scheduler_url: Option<String>,

    /// Directory holding component checkouts, overriding the configuration
    #[arg(long, global = true, env = "COMMITCI_CHECKOUT_ROOT")]
    checkout_root: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Install or refresh the dispatcher job of a component
    Enable {
        component: String,
        /// Node the jobs are pinned to
        #[arg(long)]
        slave: String,
        #[command(flatten)]
        platform: commands::PlatformArgs,
    },
    /// Remove the dispatcher job of a component
    Disable { component: String },
    /// Decide whether a push builds and trigger the branch worker
    ConsiderBuild {
        component: String,
        #[command(flatten)]
        commit: commands::CommitArgs,
        #[arg(long)]
        slave: String,
        #[command(flatten)]
        platform: commands::PlatformArgs,
        /// Marker file in the checkout that flags the branch as staging
        #[arg(long)]
        config_file: Option<String>,
    },
    /// Check out a branch and run scratch builds on every target
    Build {
        component: String,
        #[command(flatten)]
        commit: commands::CommitArgs,
        /// Use the staging build policy
        #[arg(long)]
        staging: bool,
        /// Write the notification to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Validate a system configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "commitci.kdl")]
        path: PathBuf,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let globals = commands::Globals {
        config: cli.config,
        scheduler_url: cli.scheduler_url,
        checkout_root: cli.checkout_root,
    };

    match cli.command {
        Commands::Enable {
            component,
            slave,
            platform,
        } => {
            commands::dispatch::enable(&globals, &component, &slave, &platform).await?;
        }
        Commands::Disable { component } => {
            commands::dispatch::disable(&globals, &component).await?;
        }
        Commands::ConsiderBuild {
            component,
            commit,
            slave,
            platform,
            config_file,
        } => {
            commands::dispatch::consider_build(
                &globals,
                &component,
                &commit,
                &slave,
                &platform,
                config_file.as_deref(),
            )
            .await?;
        }
        Commands::Build {
            component,
            commit,
            staging,
            report,
        } => {
            commands::build::build(&globals, &component, &commit, staging, report).await?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}
