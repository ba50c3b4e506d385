pub mod scheduler;

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::process::Command;

use crate::error::DeployError;

pub use scheduler::{DeployScheduler, Request};

/// Placeholder replaced by the changed path inside each command argument.
pub const PATH_PLACEHOLDER: &str = "{path}";

/// The external deploy command as an argument vector. Never run through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for DeployCommand {
    fn default() -> Self {
        Self {
            program: "sfdx".to_owned(),
            args: vec![
                "force:source:deploy".to_owned(),
                "-p".to_owned(),
                PATH_PLACEHOLDER.to_owned(),
            ],
        }
    }
}

impl DeployCommand {
    /// Substitute `path` into the argument template.
    ///
    /// An argument that is exactly the placeholder receives the path verbatim;
    /// an argument that embeds it (`--source-dir={path}`) gets a lossy string
    /// substitution.
    pub fn render_args(&self, path: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| {
                if arg == PATH_PLACEHOLDER {
                    path.as_os_str().to_owned()
                } else if arg.contains(PATH_PLACEHOLDER) {
                    OsString::from(arg.replace(PATH_PLACEHOLDER, &path.to_string_lossy()))
                } else {
                    OsString::from(arg)
                }
            })
            .collect()
    }
}

/// Result of a deploy whose process exited successfully.
#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    pub path: PathBuf,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Anything that can deploy one changed path. The session depends on this
/// rather than on [`DeployDispatcher`] directly.
pub trait Deployer: Send + Sync + 'static {
    fn deploy(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<DeployOutcome, DeployError>> + Send;
}

/// Runs the external deploy CLI, one process per call.
#[derive(Debug, Clone)]
pub struct DeployDispatcher {
    command: DeployCommand,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl DeployDispatcher {
    pub fn new(command: DeployCommand) -> Self {
        Self {
            command,
            working_dir: None,
            timeout: None,
        }
    }

    /// Run the command from `dir` (the project root, for sfdx).
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Kill the process and fail with `Timeout` once `timeout` elapses.
    /// `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &DeployCommand {
        &self.command
    }

    async fn run(&self, path: &Path) -> Result<DeployOutcome, DeployError> {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(self.command.render_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let child = cmd.spawn().map_err(|source| DeployError::SpawnFailed {
            program: self.command.program.clone(),
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), pid = child.id(), "deploy process started");

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(res) => res,
                // The child is dropped with the future and killed (kill_on_drop).
                Err(_) => {
                    return Err(DeployError::Timeout {
                        path: path.to_path_buf(),
                        timeout: limit,
                    });
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|source| DeployError::SpawnFailed {
            program: self.command.program.clone(),
            path: path.to_path_buf(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(DeployError::NonZeroExit {
                path: path.to_path_buf(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(DeployOutcome {
            path: path.to_path_buf(),
            exit_code: output.status.code(),
            stdout,
            stderr,
            elapsed: started.elapsed(),
        })
    }
}

impl Deployer for DeployDispatcher {
    async fn deploy(&self, path: &Path) -> Result<DeployOutcome, DeployError> {
        self.run(path).await
    }
}
