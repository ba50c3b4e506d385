//! Error types for the watch/deploy core.
//!
//! Library code returns these `thiserror` enums; the binary wraps them in `anyhow`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// A selection that cannot be accepted. The session state is left untouched.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("no files or folders were selected")]
    EmptySelection,

    #[error("{} selected path(s) outside {}: {}", paths.len(), root.display(), display_paths(paths))]
    OutsideRoot { paths: Vec<PathBuf>, root: PathBuf },
}

/// A single target could not be watched. The target is skipped, the rest stay watched.
#[derive(Debug, Error)]
pub enum WatchCreationError {
    #[error("cannot watch {}: path does not exist", path.display())]
    Missing { path: PathBuf },

    #[error("cannot watch {}: {source}", path.display())]
    Backend {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Coarse classification of a failed deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployErrorKind {
    SpawnFailed,
    NonZeroExit,
    Timeout,
}

/// A deploy run that did not succeed.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("failed to start `{program}` for {}: {source}", path.display())]
    SpawnFailed {
        program: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("deploy of {} exited with {}{}", path.display(), exit_label(*code), stderr_suffix(stderr))]
    NonZeroExit {
        path: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("deploy of {} timed out after {}s", path.display(), timeout.as_secs_f64())]
    Timeout { path: PathBuf, timeout: Duration },
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            Self::SpawnFailed { .. } => DeployErrorKind::SpawnFailed,
            Self::NonZeroExit { .. } => DeployErrorKind::NonZeroExit,
            Self::Timeout { .. } => DeployErrorKind::Timeout,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::SpawnFailed { path, .. }
            | Self::NonZeroExit { path, .. }
            | Self::Timeout { path, .. } => path.as_path(),
        }
    }
}

/// Errors returned by `SessionState` operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("nothing is selected; select files or folders first")]
    NothingSelected,

    #[error("none of the {0} selected target(s) could be watched")]
    NoWatches(usize),

    #[error("session is not watching")]
    NotWatching,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_owned(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outside_root_message_lists_paths() {
        let err = ValidationError::OutsideRoot {
            paths: vec![PathBuf::from("/a/B.cls"), PathBuf::from("/c/D.cls")],
            root: PathBuf::from("/root"),
        };
        assert_eq!(
            err.to_string(),
            "2 selected path(s) outside /root: /a/B.cls, /c/D.cls"
        );
    }

    #[test]
    fn test_non_zero_exit_message_includes_trimmed_stderr() {
        let err = DeployError::NonZeroExit {
            path: PathBuf::from("/p/A.cls"),
            code: Some(1),
            stderr: "  ERROR: bad metadata\n".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "deploy of /p/A.cls exited with status 1: ERROR: bad metadata"
        );
        assert_eq!(err.kind(), DeployErrorKind::NonZeroExit);
    }

    #[test]
    fn test_non_zero_exit_without_stderr_or_code() {
        let err = DeployError::NonZeroExit {
            path: PathBuf::from("/p/A.cls"),
            code: None,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "deploy of /p/A.cls exited with a signal");
    }
}
