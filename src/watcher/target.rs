use std::path::{Path, PathBuf};

use serde::Serialize;

/// A selected file or folder. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchTarget {
    pub path: PathBuf,
    pub is_directory: bool,
}

impl WatchTarget {
    pub fn new(path: impl Into<PathBuf>, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            is_directory,
        }
    }

    /// Build a target, reading `is_directory` from filesystem metadata.
    /// A path that does not exist (yet) is treated as a file.
    pub fn from_path(path: &Path) -> Self {
        Self::new(path, path.is_dir())
    }

    /// Build a deduplicated target list, keeping the first occurrence of each path.
    pub fn dedup_paths(paths: &[PathBuf]) -> Vec<Self> {
        let mut targets: Vec<Self> = Vec::with_capacity(paths.len());
        for path in paths {
            if !targets.iter().any(|t| t.path == *path) {
                targets.push(Self::from_path(path));
            }
        }
        targets
    }
}
