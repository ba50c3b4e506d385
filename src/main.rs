mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, ProjectArgs};
use sf_autodeploy::config::{AutodeployConfig, DeployConfig};
use sf_autodeploy::dispatch::{DeployDispatcher, Deployer};
use sf_autodeploy::output::{
    SelectionReport, TerminalPresenter, print_deploy_result, print_selection_report,
};
use sf_autodeploy::session::{SessionConfig, SessionState};
use sf_autodeploy::validator;
use sf_autodeploy::watcher::classify::build_forceignore_matcher;
use sf_autodeploy::watcher::{ChangeFilter, WatchRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Watch {
            paths,
            project,
            debounce_ms,
            timeout_secs,
        } => run_watch(&paths, &project, debounce_ms, timeout_secs).await,
        Commands::Check { paths, project } => run_check(&paths, &project),
        Commands::Deploy {
            path,
            project,
            timeout_secs,
        } => run_deploy(&path, &project, timeout_secs).await,
    }
}

/// Logs go to stderr so stdout stays clean for status lines and JSON.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "sf_autodeploy=debug"
    } else {
        "sf_autodeploy=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Project root, its configuration and the effective allowed root.
struct Project {
    cwd: PathBuf,
    root: PathBuf,
    config: AutodeployConfig,
    allowed_root: PathBuf,
}

impl Project {
    fn resolve(args: &ProjectArgs) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to read the current directory")?;
        let root = match &args.project {
            Some(p) => absolutize(&cwd, p),
            None => cwd.clone(),
        };
        if !root.is_dir() {
            bail!("project root {} is not a directory", root.display());
        }
        let config = AutodeployConfig::load(&root);
        let allowed_root = if args.any_root {
            PathBuf::new()
        } else if let Some(r) = &args.allowed_root {
            absolutize(&cwd, r)
        } else {
            config.resolve_allowed_root(&root)
        };
        Ok(Self {
            cwd,
            root,
            config,
            allowed_root,
        })
    }

    fn selection(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths.iter().map(|p| absolutize(&self.cwd, p)).collect()
    }

    fn dispatcher(&self, timeout_secs: Option<u64>) -> DeployDispatcher {
        DeployDispatcher::new(self.config.deploy.command())
            .with_working_dir(&self.root)
            .with_timeout(resolve_timeout(timeout_secs, &self.config.deploy))
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    validator::normalize(&base.join(path))
}

fn resolve_timeout(flag: Option<u64>, config: &DeployConfig) -> Option<Duration> {
    match flag {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.timeout(),
    }
}

async fn run_watch(
    paths: &[PathBuf],
    args: &ProjectArgs,
    debounce_ms: Option<u64>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let project = Project::resolve(args)?;
    let config = &project.config;

    let debounce = debounce_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.watch.debounce());
    let filter = ChangeFilter::new(
        config.filters.clone(),
        build_forceignore_matcher(&project.root),
    );
    let presenter = Arc::new(TerminalPresenter::new(args.json));

    let session = SessionState::new(
        SessionConfig {
            allowed_root: project.allowed_root.clone(),
            display_interval: config.watch.display_interval(),
        },
        WatchRegistry::new(debounce, filter),
        Arc::new(project.dispatcher(timeout_secs)),
        presenter.clone(),
        presenter,
    );

    session
        .select(&project.selection(paths))
        .context("invalid selection")?;
    session
        .start_watching()
        .context("failed to start watching")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    session.reset();
    Ok(())
}

fn run_check(paths: &[PathBuf], args: &ProjectArgs) -> Result<()> {
    let project = Project::resolve(args)?;
    let (accepted, rejected): (Vec<PathBuf>, Vec<PathBuf>) = project
        .selection(paths)
        .into_iter()
        .partition(|p| validator::validate(p, &project.allowed_root));

    let report = SelectionReport {
        allowed_root: project.allowed_root,
        accepted,
        rejected,
    };
    print_selection_report(&report, args.json);

    if !report.rejected.is_empty() {
        bail!(
            "{} path(s) outside the allowed root",
            report.rejected.len()
        );
    }
    Ok(())
}

async fn run_deploy(path: &Path, args: &ProjectArgs, timeout_secs: Option<u64>) -> Result<()> {
    let project = Project::resolve(args)?;
    let path = absolutize(&project.cwd, path);
    if !validator::validate(&path, &project.allowed_root) {
        bail!(
            "{} is outside the allowed root {}",
            path.display(),
            project.allowed_root.display()
        );
    }

    let result = project.dispatcher(timeout_secs).deploy(&path).await;
    print_deploy_result(&result, args.json);
    if result.is_err() {
        bail!("deploy failed");
    }
    Ok(())
}
