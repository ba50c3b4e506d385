pub mod classify;
pub mod target;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use parking_lot::Mutex;

use crate::error::WatchCreationError;

pub use classify::ChangeFilter;
pub use target::WatchTarget;

/// Callback invoked with every changed path that survives classification.
/// Runs on the notify thread, so it must not block.
pub type ChangeCallback = Arc<dyn Fn(PathBuf) + Send + Sync>;

/// Opaque token for one live watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

/// A live filesystem subscription. Dropping it stops the OS watcher.
struct WatchHandle {
    id: WatchId,
    target: WatchTarget,
    _debouncer: Debouncer<notify::RecommendedWatcher>,
}

#[derive(Default)]
struct Handles {
    next_id: u64,
    live: Vec<WatchHandle>,
}

/// Owns every active watch. Bookkeeping is serialized by a mutex, so concurrent
/// `add`/`remove_all` calls never interleave.
pub struct WatchRegistry {
    handles: Mutex<Handles>,
    debounce: Duration,
    filter: Arc<ChangeFilter>,
}

impl WatchRegistry {
    /// `debounce` is the per-path quiet window: a path is reported only once it
    /// has seen no events for that long.
    pub fn new(debounce: Duration, filter: ChangeFilter) -> Self {
        Self {
            handles: Mutex::new(Handles::default()),
            debounce,
            filter: Arc::new(filter),
        }
    }

    /// Start monitoring `target`, invoking `on_change` for each changed file.
    ///
    /// Folders are watched recursively. Files are watched through their parent
    /// directory so editors that save by rename keep triggering.
    pub fn add(
        &self,
        target: WatchTarget,
        on_change: ChangeCallback,
    ) -> Result<WatchId, WatchCreationError> {
        if !target.path.exists() {
            return Err(WatchCreationError::Missing { path: target.path });
        }

        let (watch_root, mode) = if target.is_directory {
            (target.path.clone(), RecursiveMode::Recursive)
        } else {
            let parent = target
                .path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            (parent, RecursiveMode::NonRecursive)
        };

        let filter = Arc::clone(&self.filter);
        let event_target = target.clone();
        let mut debouncer = new_debouncer(self.debounce, move |res: DebounceEventResult| {
            match res {
                Ok(events) => {
                    for event in events {
                        match filter.classify(&event.path, &event_target) {
                            Some(path) => on_change(path),
                            None => tracing::trace!(path = %event.path.display(), "skipped fs event"),
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(watched = %event_target.path.display(), error = ?err, "watch error");
                }
            }
        })
        .map_err(|source| WatchCreationError::Backend {
            path: target.path.clone(),
            source,
        })?;

        debouncer
            .watcher()
            .watch(&watch_root, mode)
            .map_err(|source| WatchCreationError::Backend {
                path: target.path.clone(),
                source,
            })?;

        let mut handles = self.handles.lock();
        let id = WatchId(handles.next_id);
        handles.next_id += 1;
        tracing::debug!(path = %target.path.display(), directory = target.is_directory, "watch added");
        handles.live.push(WatchHandle {
            id,
            target,
            _debouncer: debouncer,
        });
        Ok(id)
    }

    /// Release every live watch. Calling it with nothing watched is a no-op.
    pub fn remove_all(&self) {
        let released = std::mem::take(&mut self.handles.lock().live);
        if !released.is_empty() {
            tracing::debug!(count = released.len(), "watches released");
        }
    }

    pub fn count(&self) -> usize {
        self.handles.lock().live.len()
    }

    /// Targets currently watched, in the order they were added.
    pub fn targets(&self) -> Vec<WatchTarget> {
        self.handles
            .lock()
            .live
            .iter()
            .map(|h| h.target.clone())
            .collect()
    }

    pub fn contains(&self, id: WatchId) -> bool {
        self.handles.lock().live.iter().any(|h| h.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn noop() -> ChangeCallback {
        Arc::new(|_| {})
    }

    fn registry() -> WatchRegistry {
        WatchRegistry::new(Duration::from_millis(50), ChangeFilter::permissive())
    }

    #[test]
    fn test_add_and_remove_all() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("A.cls");
        fs::write(&file, "a").unwrap();

        let registry = registry();
        let a = registry.add(WatchTarget::new(dir.path(), true), noop()).unwrap();
        let b = registry.add(WatchTarget::new(&file, false), noop()).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.count(), 2);
        assert!(registry.contains(a));

        registry.remove_all();
        assert_eq!(registry.count(), 0);
        assert!(!registry.contains(a));
    }

    #[test]
    fn test_remove_all_is_idempotent() {
        let registry = registry();
        registry.remove_all();
        registry.remove_all();
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_missing_path_fails_with_watch_creation_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("Gone.cls");
        let registry = registry();
        match registry.add(WatchTarget::new(&missing, false), noop()) {
            Err(WatchCreationError::Missing { path }) => assert_eq!(path, missing),
            other => panic!("expected Missing, got {:?}", other.map(|_| ())),
        }
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_file_change_reaches_callback() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("A.cls");
        fs::write(&file, "public class A {}").unwrap();

        let (tx, rx) = std::sync::mpsc::channel::<PathBuf>();
        let tx = Mutex::new(tx);
        let registry = registry();
        registry
            .add(
                WatchTarget::new(&file, false),
                Arc::new(move |path| {
                    let _ = tx.lock().send(path);
                }),
            )
            .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        fs::write(&file, "public class A { void m() {} }").unwrap();

        let changed = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("change event within 5s");
        assert_eq!(changed.file_name(), file.file_name());
    }
}
