use std::path::{Component, Path, PathBuf};

use crate::error::ValidationError;

/// Lexically normalize a path: drop `.` components and let `..` pop the previous
/// normal component. No filesystem access, symlinks are not resolved.
///
/// A `..` that cannot pop anything is kept on relative paths and dropped on
/// rooted paths (`/..` is `/`).
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// Check whether `path` equals or is nested under `allowed_root`.
///
/// Containment is component-wise (`/a/force-app2` is not under `/a/force-app`)
/// and case-sensitive on every platform. An empty `allowed_root` disables the
/// constraint.
pub fn validate(path: &Path, allowed_root: &Path) -> bool {
    if allowed_root.as_os_str().is_empty() {
        return true;
    }
    normalize(path).starts_with(normalize(allowed_root))
}

/// Validate a whole selection. Every offending path is reported, not just the first.
pub fn validate_all(paths: &[PathBuf], allowed_root: &Path) -> Result<(), ValidationError> {
    if paths.is_empty() {
        return Err(ValidationError::EmptySelection);
    }
    let rejected: Vec<PathBuf> = paths
        .iter()
        .filter(|p| !validate(p, allowed_root))
        .cloned()
        .collect();
    if rejected.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::OutsideRoot {
            paths: rejected,
            root: allowed_root.to_path_buf(),
        })
    }
}
