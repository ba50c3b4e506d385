use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Watch Salesforce DX source files and deploy them as soon as they change.
///
/// sf-autodeploy runs the configured deploy CLI (by default
/// `sfdx force:source:deploy -p <path>`) for every saved file under the
/// selected files and folders.
#[derive(Parser, Debug)]
#[command(
    name = "sf-autodeploy",
    version,
    about,
    long_about = None,
    propagate_version = true,
)]
pub struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project root containing sf-autodeploy.toml and .forceignore (default: current directory).
    #[arg(long)]
    pub project: Option<PathBuf>,

    /// Override the allowed root from sf-autodeploy.toml.
    #[arg(long)]
    pub allowed_root: Option<PathBuf>,

    /// Accept selections anywhere, disabling the allowed-root check.
    #[arg(long, conflicts_with = "allowed_root")]
    pub any_root: bool,

    /// Output results as JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch files or folders and deploy each one when it changes.
    ///
    /// Runs until interrupted with Ctrl-C.
    Watch {
        /// Files or folders to watch.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        project: ProjectArgs,

        /// Quiet window in milliseconds before a change is deployed.
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Deploy timeout in seconds (0 waits indefinitely).
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Check a selection against the allowed root without watching.
    ///
    /// Exits with a non-zero status if any path is rejected.
    Check {
        /// Files or folders to check.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Deploy a single file or folder once and report the result.
    Deploy {
        /// File or folder to deploy.
        path: PathBuf,

        #[command(flatten)]
        project: ProjectArgs,

        /// Deploy timeout in seconds (0 waits indefinitely).
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}
