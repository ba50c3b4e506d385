use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::filters::SelectionFilters;

use super::target::WatchTarget;

/// Directories whose contents never trigger a deploy, whatever `.forceignore` says.
const SKIPPED_DIRS: &[&str] = &[".git", ".sf", ".sfdx", "node_modules"];

/// Build a matcher from the project's `.forceignore`, which uses gitignore syntax.
/// If no `.forceignore` exists, returns an empty matcher that matches nothing.
pub fn build_forceignore_matcher(project_root: &Path) -> Gitignore {
    let mut builder = GitignoreBuilder::new(project_root);
    let forceignore = project_root.join(".forceignore");
    if forceignore.exists()
        && let Some(err) = builder.add(&forceignore)
    {
        tracing::warn!(path = %forceignore.display(), error = %err, "ignoring malformed .forceignore lines");
    }
    builder.build().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "failed to build .forceignore matcher");
        Gitignore::empty()
    })
}

/// Decides which debounced filesystem paths are content changes worth deploying.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    filters: SelectionFilters,
    forceignore: Gitignore,
}

impl ChangeFilter {
    pub fn new(filters: SelectionFilters, forceignore: Gitignore) -> Self {
        Self {
            filters,
            forceignore,
        }
    }

    /// A filter with no extension groups and no ignore rules.
    pub fn permissive() -> Self {
        Self::new(SelectionFilters::accept_all(), Gitignore::empty())
    }

    /// Classify a debounced path against the target it was reported for.
    ///
    /// File targets accept only their own path. Folder targets apply, in order:
    /// hardcoded directory exclusions, `.forceignore`, existence (deletions are
    /// dropped), then the extension groups.
    pub fn classify(&self, path: &Path, target: &WatchTarget) -> Option<PathBuf> {
        if !target.is_directory {
            return (path == target.path && path.is_file()).then(|| path.to_path_buf());
        }

        if !path.starts_with(&target.path) {
            return None;
        }
        if path
            .components()
            .any(|c| SKIPPED_DIRS.iter().any(|d| c.as_os_str() == *d))
        {
            return None;
        }
        if self.is_forceignored(path) {
            return None;
        }
        if !path.is_file() {
            return None;
        }
        if !self.filters.matches(path) {
            return None;
        }
        Some(path.to_path_buf())
    }

    /// A rule naming a directory also excludes everything below it. Paths
    /// outside the project root are never ignored.
    fn is_forceignored(&self, path: &Path) -> bool {
        path.starts_with(self.forceignore.path())
            && self
                .forceignore
                .matched_path_or_any_parents(path, false)
                .is_ignore()
    }
}
