//! The watch session state machine.
//!
//! ```text
//! NoSelection ──select──▶ Selected ──start──▶ Watching ──change──▶ Deploying
//!                            ▲                   ▲  │                  │
//!                            └──────stop─────────┘  │        Deployed | DeployError
//!                                                   └──(display interval)──┘
//! ```
//!
//! All transitions happen under one mutex. Deploy processes run on the Tokio
//! runtime outside the lock; every watch set and every deploy is stamped with
//! a generation so completions that outlive a stop or reset are ignored.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::dispatch::scheduler::SlotState;
use crate::dispatch::{DeployOutcome, DeployScheduler, Deployer, Request};
use crate::error::{DeployError, DeployErrorKind, SessionError};
use crate::status::{NoticeLevel, Notifier, SessionStatus, StatusSink};
use crate::validator;
use crate::watcher::{ChangeCallback, WatchRegistry, WatchTarget};

/// How long `Deployed`/`DeployError` stays visible before reverting.
pub const DEFAULT_DISPLAY_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Selections must live under this root. Empty disables the check.
    pub allowed_root: PathBuf,
    pub display_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allowed_root: PathBuf::new(),
            display_interval: DEFAULT_DISPLAY_INTERVAL,
        }
    }
}

/// Summary of the most recent deploy that completed in a live generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastDeploy {
    pub path: PathBuf,
    pub error: Option<DeployErrorKind>,
    pub message: String,
}

struct Inner {
    status: SessionStatus,
    selection: Vec<WatchTarget>,
    generation: u64,
    /// Bumped on every Deployed/DeployError flash so only the newest revert timer applies.
    flash_seq: u64,
    item_count: usize,
    last_deploy: Option<LastDeploy>,
}

pub struct SessionState<D: Deployer> {
    inner: Mutex<Inner>,
    registry: WatchRegistry,
    scheduler: DeployScheduler,
    deployer: Arc<D>,
    sink: Arc<dyn StatusSink>,
    notifier: Arc<dyn Notifier>,
    config: SessionConfig,
    runtime: Handle,
}

impl<D: Deployer> SessionState<D> {
    /// Create a session in `NoSelection`.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; deploys and timers are
    /// spawned on that runtime.
    pub fn new(
        config: SessionConfig,
        registry: WatchRegistry,
        deployer: Arc<D>,
        sink: Arc<dyn StatusSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                status: SessionStatus::NoSelection,
                selection: Vec::new(),
                generation: 0,
                flash_seq: 0,
                item_count: 0,
                last_deploy: None,
            }),
            registry,
            scheduler: DeployScheduler::new(),
            deployer,
            sink,
            notifier,
            config,
            runtime: Handle::current(),
        })
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().status
    }

    pub fn selection(&self) -> Vec<WatchTarget> {
        self.inner.lock().selection.clone()
    }

    pub fn watch_count(&self) -> usize {
        self.registry.count()
    }

    pub fn last_deploy(&self) -> Option<LastDeploy> {
        self.inner.lock().last_deploy.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// True while a deploy for `path` is running or queued.
    pub fn is_deploying(&self, path: &Path) -> bool {
        self.scheduler.state(path) != SlotState::Idle
    }

    /// Replace the selection. All-or-nothing: if any path is outside the
    /// allowed root, or the list is empty, nothing changes and a warning is
    /// emitted. Selecting while watching releases the current watches.
    pub fn select(&self, paths: &[PathBuf]) -> Result<usize, SessionError> {
        let mut inner = self.inner.lock();
        if let Err(err) = validator::validate_all(paths, &self.config.allowed_root) {
            warn!(error = %err, "selection rejected");
            self.notifier
                .notify(NoticeLevel::Warning, &format!("Selection rejected: {err}"));
            return Err(err.into());
        }

        if inner.status.is_watching() {
            self.registry.remove_all();
            inner.generation += 1;
        }
        inner.selection = WatchTarget::dedup_paths(paths);
        let count = inner.selection.len();
        info!(count, "selection replaced");
        self.set_status(&mut inner, SessionStatus::Selected);
        Ok(count)
    }

    /// Watch every selected target. Restarts cleanly when already watching.
    ///
    /// Targets that cannot be watched are reported and skipped. Returns the
    /// number of live watches.
    pub fn start_watching(self: &Arc<Self>) -> Result<usize, SessionError> {
        let mut inner = self.inner.lock();
        if inner.selection.is_empty() {
            self.notifier.notify(
                NoticeLevel::Info,
                "Select files or folders to watch first.",
            );
            return Err(SessionError::NothingSelected);
        }

        self.registry.remove_all();
        inner.generation += 1;
        let generation = inner.generation;

        let (tx, rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watched = 0;
        for target in inner.selection.clone() {
            let tx = tx.clone();
            let on_change: ChangeCallback = Arc::new(move |path: PathBuf| {
                if let Err(err) = tx.send(path) {
                    trace!(path = %err.0.display(), generation, "change dropped: event pump stopped");
                }
            });
            match self.registry.add(target, on_change) {
                Ok(_) => watched += 1,
                Err(err) => {
                    warn!(error = %err, "watch skipped");
                    self.notifier.notify(NoticeLevel::Error, &err.to_string());
                }
            }
        }
        drop(tx);

        if watched == 0 {
            let total = inner.selection.len();
            self.set_status(&mut inner, SessionStatus::Selected);
            return Err(SessionError::NoWatches(total));
        }

        self.spawn_event_pump(generation, rx);
        info!(watched, generation, "watching");
        self.set_status(&mut inner, SessionStatus::Watching);
        self.notifier.notify(
            NoticeLevel::Info,
            &format!("Watching {watched} item(s) for changes."),
        );
        Ok(watched)
    }

    /// Release every watch and go back to `Selected`. No-op unless watching.
    pub fn stop_watching(&self) {
        let mut inner = self.inner.lock();
        if !inner.status.is_watching() {
            debug!(status = ?inner.status, "stop ignored: not watching");
            return;
        }
        self.registry.remove_all();
        inner.generation += 1;
        info!("stopped watching");
        self.set_status(&mut inner, SessionStatus::Selected);
        self.notifier.notify(NoticeLevel::Info, "Stopped watching.");
    }

    /// Release every watch, forget the selection and return to `NoSelection`.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.registry.remove_all();
        inner.generation += 1;
        inner.selection.clear();
        info!("session reset");
        self.set_status(&mut inner, SessionStatus::NoSelection);
    }

    /// Feed a change for `path` into the current generation.
    pub fn on_file_changed(self: &Arc<Self>, path: impl Into<PathBuf>) -> Result<(), SessionError> {
        let generation = self.inner.lock().generation;
        self.handle_change(generation, path.into())
    }

    fn handle_change(self: &Arc<Self>, generation: u64, path: PathBuf) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if inner.generation != generation || !inner.status.is_watching() {
            debug!(path = %path.display(), "change ignored: not watching");
            return Err(SessionError::NotWatching);
        }
        match self.scheduler.request(&path, generation) {
            Request::Start => self.begin_deploy(&mut inner, generation, path),
            Request::Coalesced => {
                debug!(path = %path.display(), "deploy in flight, queued trailing deploy");
            }
        }
        Ok(())
    }

    /// Drain watch callbacks in arrival order. Ends once the generation's
    /// watches are released and every sender is gone.
    fn spawn_event_pump(self: &Arc<Self>, generation: u64, mut rx: mpsc::UnboundedReceiver<PathBuf>) {
        let session = Arc::downgrade(self);
        self.runtime.spawn(async move {
            while let Some(path) = rx.recv().await {
                let Some(session) = session.upgrade() else {
                    break;
                };
                if session.handle_change(generation, path).is_err() {
                    break;
                }
            }
            debug!(generation, "event pump finished");
        });
    }

    fn begin_deploy(self: &Arc<Self>, inner: &mut Inner, generation: u64, path: PathBuf) {
        self.set_status(inner, SessionStatus::Deploying);
        self.notifier
            .notify(NoticeLevel::Info, &format!("Deploying {}...", path.display()));

        let session = Arc::clone(self);
        self.runtime.spawn(async move {
            let result = session.deployer.deploy(&path).await;
            session.finish_deploy(generation, path, result);
        });
    }

    fn finish_deploy(
        self: &Arc<Self>,
        generation: u64,
        path: PathBuf,
        result: Result<DeployOutcome, DeployError>,
    ) {
        let mut inner = self.inner.lock();
        let rerun = self.scheduler.complete(&path, inner.generation);

        match &result {
            Ok(outcome) => info!(path = %path.display(), elapsed = ?outcome.elapsed, "deployed"),
            Err(err) => warn!(path = %path.display(), kind = ?err.kind(), error = %err, "deploy failed"),
        }

        if inner.generation == generation && inner.status.is_watching() {
            let (status, level, message, error) = match &result {
                Ok(outcome) => (
                    SessionStatus::Deployed,
                    NoticeLevel::Info,
                    format!(
                        "Deployed {} in {:.1}s",
                        path.display(),
                        outcome.elapsed.as_secs_f64()
                    ),
                    None,
                ),
                Err(err) => (
                    SessionStatus::DeployError,
                    NoticeLevel::Error,
                    format!("Deploy failed: {err}"),
                    Some(err.kind()),
                ),
            };
            self.notifier.notify(level, &message);
            inner.last_deploy = Some(LastDeploy {
                path: path.clone(),
                error,
                message,
            });
            inner.flash_seq += 1;
            let seq = inner.flash_seq;
            self.set_status(&mut inner, status);
            self.schedule_revert(generation, seq);
        } else {
            debug!(path = %path.display(), generation, "ignoring completion from a stale generation");
        }

        if rerun {
            if inner.status.is_watching() {
                let current = inner.generation;
                self.begin_deploy(&mut inner, current, path);
            } else {
                self.scheduler.release(&path);
            }
        }
    }

    fn schedule_revert(self: &Arc<Self>, generation: u64, seq: u64) {
        let session = Arc::clone(self);
        let interval = self.config.display_interval;
        self.runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            session.revert_flash(generation, seq);
        });
    }

    fn revert_flash(&self, generation: u64, seq: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.flash_seq != seq {
            return;
        }
        if !matches!(
            inner.status,
            SessionStatus::Deployed | SessionStatus::DeployError
        ) {
            return;
        }
        let next = if self.scheduler.in_flight(generation) > 0 {
            SessionStatus::Deploying
        } else {
            SessionStatus::Watching
        };
        self.set_status(&mut inner, next);
    }

    /// Apply a transition and tell the sink if status or item count changed.
    fn set_status(&self, inner: &mut Inner, status: SessionStatus) {
        let item_count = match status {
            SessionStatus::NoSelection => 0,
            s if s.is_watching() => self.registry.count(),
            _ => inner.selection.len(),
        };
        if inner.status == status && inner.item_count == item_count {
            return;
        }
        debug!(from = ?inner.status, to = ?status, item_count, "status");
        inner.status = status;
        inner.item_count = item_count;
        self.sink.on_status_changed(status, item_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::ChangeFilter;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<(SessionStatus, usize)>>,
    }

    impl StatusSink for RecordingSink {
        fn on_status_changed(&self, status: SessionStatus, item_count: usize) {
            self.events.lock().push((status, item_count));
        }
    }

    impl RecordingSink {
        fn statuses(&self) -> Vec<SessionStatus> {
            self.events.lock().iter().map(|(s, _)| *s).collect()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<(NoticeLevel, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, level: NoticeLevel, message: &str) {
            self.notices.lock().push((level, message.to_owned()));
        }
    }

    impl RecordingNotifier {
        fn count(&self, level: NoticeLevel) -> usize {
            self.notices.lock().iter().filter(|(l, _)| *l == level).count()
        }
    }

    #[derive(Default)]
    struct FakeDeployer {
        calls: Mutex<Vec<PathBuf>>,
        fail: bool,
        gate: Option<Arc<Semaphore>>,
        /// Per-path gates, taking precedence over `gate`.
        path_gates: HashMap<PathBuf, Arc<Semaphore>>,
    }

    impl FakeDeployer {
        fn calls(&self) -> Vec<PathBuf> {
            self.calls.lock().clone()
        }
    }

    impl Deployer for FakeDeployer {
        async fn deploy(&self, path: &Path) -> Result<DeployOutcome, DeployError> {
            self.calls.lock().push(path.to_path_buf());
            if let Some(gate) = self.path_gates.get(path).or(self.gate.as_ref()) {
                gate.acquire().await.expect("gate closed").forget();
            }
            if self.fail {
                return Err(DeployError::SpawnFailed {
                    program: "sfdx".to_owned(),
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "sfdx not installed"),
                });
            }
            Ok(DeployOutcome {
                path: path.to_path_buf(),
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
                elapsed: Duration::from_millis(10),
            })
        }
    }

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        class_file: PathBuf,
        lwc_dir: PathBuf,
        session: Arc<SessionState<FakeDeployer>>,
        sink: Arc<RecordingSink>,
        notifier: Arc<RecordingNotifier>,
        deployer: Arc<FakeDeployer>,
    }

    fn fixture(deployer: FakeDeployer) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("force-app/main/default");
        let class_file = root.join("classes/A.cls");
        let lwc_dir = root.join("lwc/hello");
        fs::create_dir_all(class_file.parent().unwrap()).unwrap();
        fs::create_dir_all(&lwc_dir).unwrap();
        fs::write(&class_file, "public class A {}").unwrap();
        fs::write(lwc_dir.join("hello.js"), "export default class Hello {}").unwrap();

        let sink = Arc::new(RecordingSink::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let deployer = Arc::new(deployer);
        let session = SessionState::new(
            SessionConfig {
                allowed_root: root.clone(),
                display_interval: DEFAULT_DISPLAY_INTERVAL,
            },
            WatchRegistry::new(Duration::from_millis(50), ChangeFilter::permissive()),
            Arc::clone(&deployer),
            sink.clone(),
            notifier.clone(),
        );
        Fixture {
            _dir: dir,
            root,
            class_file,
            lwc_dir,
            session,
            sink,
            notifier,
            deployer,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(10)).await;
    }

    #[tokio::test]
    async fn test_select_under_root_is_accepted() {
        let f = fixture(FakeDeployer::default());
        assert_eq!(f.session.status(), SessionStatus::NoSelection);
        let count = f.session.select(&[f.class_file.clone()]).unwrap();
        assert_eq!(count, 1);
        assert_eq!(f.session.status(), SessionStatus::Selected);
        assert_eq!(f.sink.events.lock().clone(), vec![(SessionStatus::Selected, 1)]);
    }

    #[tokio::test]
    async fn test_select_outside_root_is_rejected_without_state_change() {
        let f = fixture(FakeDeployer::default());
        let outside = f.root.join("../../../other/B.cls");
        let err = f.session.select(&[f.class_file.clone(), outside]).unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(f.session.status(), SessionStatus::NoSelection);
        assert!(f.session.selection().is_empty());
        assert_eq!(f.notifier.count(NoticeLevel::Warning), 1);
        assert!(f.sink.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_empty_selection_is_rejected() {
        let f = fixture(FakeDeployer::default());
        f.session.select(&[f.class_file.clone()]).unwrap();
        let err = f.session.select(&[]).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Validation(crate::error::ValidationError::EmptySelection)
        ));
        assert_eq!(f.session.status(), SessionStatus::Selected);
        assert_eq!(f.session.selection().len(), 1);
    }

    #[tokio::test]
    async fn test_selection_is_deduplicated() {
        let f = fixture(FakeDeployer::default());
        let count = f
            .session
            .select(&[f.class_file.clone(), f.lwc_dir.clone(), f.class_file.clone()])
            .unwrap();
        assert_eq!(count, 2);
        let selection = f.session.selection();
        assert!(!selection[0].is_directory);
        assert!(selection[1].is_directory);
    }

    #[tokio::test]
    async fn test_start_without_selection_requests_one() {
        let f = fixture(FakeDeployer::default());
        assert!(matches!(
            f.session.start_watching(),
            Err(SessionError::NothingSelected)
        ));
        assert_eq!(f.session.status(), SessionStatus::NoSelection);
        assert_eq!(f.notifier.count(NoticeLevel::Info), 1);
    }

    #[tokio::test]
    async fn test_start_watches_every_selected_target() {
        let f = fixture(FakeDeployer::default());
        f.session
            .select(&[f.class_file.clone(), f.lwc_dir.clone()])
            .unwrap();
        assert_eq!(f.session.start_watching().unwrap(), 2);
        assert_eq!(f.session.watch_count(), f.session.selection().len());
        assert_eq!(f.session.status(), SessionStatus::Watching);
        assert_eq!(
            f.sink.events.lock().last().copied(),
            Some((SessionStatus::Watching, 2))
        );
    }

    #[tokio::test]
    async fn test_restart_does_not_duplicate_watches() {
        let f = fixture(FakeDeployer::default());
        f.session
            .select(&[f.class_file.clone(), f.lwc_dir.clone()])
            .unwrap();
        f.session.start_watching().unwrap();
        let first = f.session.generation();
        f.session.start_watching().unwrap();
        assert_eq!(f.session.watch_count(), 2);
        assert!(f.session.generation() > first);
    }

    #[tokio::test]
    async fn test_unwatchable_target_is_skipped() {
        let f = fixture(FakeDeployer::default());
        let gone = f.root.join("classes/Gone.cls");
        f.session.select(&[f.class_file.clone(), gone]).unwrap();
        assert_eq!(f.session.start_watching().unwrap(), 1);
        assert_eq!(f.session.status(), SessionStatus::Watching);
        assert_eq!(f.notifier.count(NoticeLevel::Error), 1);
    }

    #[tokio::test]
    async fn test_no_watchable_target_stays_selected() {
        let f = fixture(FakeDeployer::default());
        f.session.select(&[f.root.join("classes/Gone.cls")]).unwrap();
        assert!(matches!(
            f.session.start_watching(),
            Err(SessionError::NoWatches(1))
        ));
        assert_eq!(f.session.status(), SessionStatus::Selected);
        assert_eq!(f.session.watch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_deploys_once_and_reverts_to_watching() {
        let f = fixture(FakeDeployer::default());
        f.session.select(&[f.class_file.clone()]).unwrap();
        f.session.start_watching().unwrap();

        f.session.on_file_changed(&f.class_file).unwrap();
        settle().await;

        assert_eq!(f.deployer.calls(), vec![f.class_file.clone()]);
        assert_eq!(
            f.sink.statuses(),
            vec![
                SessionStatus::Selected,
                SessionStatus::Watching,
                SessionStatus::Deploying,
                SessionStatus::Deployed,
                SessionStatus::Watching,
            ]
        );
        let last = f.session.last_deploy().unwrap();
        assert_eq!(last.path, f.class_file);
        assert_eq!(last.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flash_lasts_for_display_interval() {
        let f = fixture(FakeDeployer::default());
        f.session.select(&[f.class_file.clone()]).unwrap();
        f.session.start_watching().unwrap();
        f.session.on_file_changed(&f.class_file).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.session.status(), SessionStatus::Deployed);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(f.session.status(), SessionStatus::Watching);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_failure_flashes_error_and_keeps_watching() {
        let f = fixture(FakeDeployer {
            fail: true,
            ..FakeDeployer::default()
        });
        f.session.select(&[f.class_file.clone()]).unwrap();
        f.session.start_watching().unwrap();

        f.session.on_file_changed(&f.class_file).unwrap();
        settle().await;

        assert_eq!(
            f.sink.statuses()[1..],
            [
                SessionStatus::Watching,
                SessionStatus::Deploying,
                SessionStatus::DeployError,
                SessionStatus::Watching,
            ]
        );
        assert_eq!(f.session.watch_count(), 1);
        assert_eq!(
            f.session.last_deploy().unwrap().error,
            Some(DeployErrorKind::SpawnFailed)
        );
        assert_eq!(f.notifier.count(NoticeLevel::Error), 1);

        // The session is still live: the next change deploys again.
        f.session.on_file_changed(&f.class_file).unwrap();
        settle().await;
        assert_eq!(f.deployer.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_changes_coalesces_into_one_trailing_deploy() {
        let gate = Arc::new(Semaphore::new(0));
        let f = fixture(FakeDeployer {
            gate: Some(gate.clone()),
            ..FakeDeployer::default()
        });
        f.session.select(&[f.class_file.clone()]).unwrap();
        f.session.start_watching().unwrap();

        for _ in 0..3 {
            f.session.on_file_changed(&f.class_file).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.deployer.calls().len(), 1);
        assert!(f.session.is_deploying(&f.class_file));

        gate.add_permits(1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.deployer.calls().len(), 2);

        gate.add_permits(1);
        settle().await;
        assert_eq!(f.deployer.calls().len(), 2);
        assert!(!f.session.is_deploying(&f.class_file));
        assert_eq!(f.session.status(), SessionStatus::Watching);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_paths_deploy_independently() {
        let gate = Arc::new(Semaphore::new(0));
        let f = fixture(FakeDeployer {
            gate: Some(gate.clone()),
            ..FakeDeployer::default()
        });
        let js = f.lwc_dir.join("hello.js");
        f.session.select(&[f.lwc_dir.clone(), f.class_file.clone()]).unwrap();
        f.session.start_watching().unwrap();

        f.session.on_file_changed(&f.class_file).unwrap();
        f.session.on_file_changed(&js).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.deployer.calls().len(), 2);

        // One finishes: the flash reverts to Deploying while the other runs.
        gate.add_permits(1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.session.status(), SessionStatus::Deploying);

        gate.add_permits(1);
        settle().await;
        assert_eq!(f.session.status(), SessionStatus::Watching);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_left_over_from_previous_watch_does_not_pin_deploying() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("force-app/main/default");
        let a = root.join("classes/A.cls");
        let b = root.join("classes/B.cls");
        fs::create_dir_all(a.parent().unwrap()).unwrap();
        fs::write(&a, "public class A {}").unwrap();
        fs::write(&b, "public class B {}").unwrap();

        let gate_a = Arc::new(Semaphore::new(0));
        let gate_b = Arc::new(Semaphore::new(0));
        let deployer = Arc::new(FakeDeployer {
            path_gates: HashMap::from([(a.clone(), gate_a.clone()), (b.clone(), gate_b.clone())]),
            ..FakeDeployer::default()
        });
        let session = SessionState::new(
            SessionConfig {
                allowed_root: root.clone(),
                display_interval: DEFAULT_DISPLAY_INTERVAL,
            },
            WatchRegistry::new(Duration::from_millis(50), ChangeFilter::permissive()),
            Arc::clone(&deployer),
            Arc::new(RecordingSink::default()),
            Arc::new(RecordingNotifier::default()),
        );

        session.select(&[a.clone(), b.clone()]).unwrap();
        session.start_watching().unwrap();
        session.on_file_changed(&a).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // A keeps running across the restart.
        session.stop_watching();
        session.start_watching().unwrap();
        session.on_file_changed(&b).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.status(), SessionStatus::Deploying);

        gate_b.add_permits(1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(session.status(), SessionStatus::Watching);

        gate_a.add_permits(1);
        settle().await;
        assert_eq!(session.status(), SessionStatus::Watching);
        assert!(!session.is_deploying(&a));
        assert_eq!(deployer.calls(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_change_outside_watching_is_rejected() {
        let f = fixture(FakeDeployer::default());
        f.session.select(&[f.class_file.clone()]).unwrap();
        assert!(matches!(
            f.session.on_file_changed(&f.class_file),
            Err(SessionError::NotWatching)
        ));
        assert!(f.deployer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stop_releases_watches_and_keeps_selection() {
        let f = fixture(FakeDeployer::default());
        f.session
            .select(&[f.class_file.clone(), f.lwc_dir.clone()])
            .unwrap();
        f.session.start_watching().unwrap();
        let selection = f.session.selection();

        f.session.stop_watching();
        assert_eq!(f.session.watch_count(), 0);
        assert_eq!(f.session.selection(), selection);
        assert_eq!(f.session.status(), SessionStatus::Selected);

        let events = f.sink.events.lock().len();
        f.session.stop_watching();
        assert_eq!(f.session.watch_count(), 0);
        assert_eq!(f.session.selection(), selection);
        assert_eq!(f.session.status(), SessionStatus::Selected);
        assert_eq!(f.sink.events.lock().len(), events);
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let f = fixture(FakeDeployer::default());
        f.session.select(&[f.class_file.clone()]).unwrap();
        f.session.start_watching().unwrap();

        f.session.reset();
        assert_eq!(f.session.watch_count(), 0);
        assert!(f.session.selection().is_empty());
        assert_eq!(f.session.status(), SessionStatus::NoSelection);
        assert_eq!(
            f.sink.events.lock().last().copied(),
            Some((SessionStatus::NoSelection, 0))
        );
    }

    #[tokio::test]
    async fn test_select_while_watching_releases_watches() {
        let f = fixture(FakeDeployer::default());
        f.session.select(&[f.class_file.clone()]).unwrap();
        f.session.start_watching().unwrap();

        f.session.select(&[f.lwc_dir.clone()]).unwrap();
        assert_eq!(f.session.status(), SessionStatus::Selected);
        assert_eq!(f.session.watch_count(), 0);
        assert_eq!(f.session.selection()[0].path, f.lwc_dir);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_after_stop_is_ignored() {
        let gate = Arc::new(Semaphore::new(0));
        let f = fixture(FakeDeployer {
            gate: Some(gate.clone()),
            ..FakeDeployer::default()
        });
        f.session.select(&[f.class_file.clone()]).unwrap();
        f.session.start_watching().unwrap();
        f.session.on_file_changed(&f.class_file).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(f.session.status(), SessionStatus::Deploying);

        f.session.stop_watching();
        gate.add_permits(1);
        settle().await;

        assert_eq!(f.session.status(), SessionStatus::Selected);
        assert_eq!(f.session.last_deploy(), None);
        assert!(!f.session.is_deploying(&f.class_file));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_after_reset_does_not_reopen_watches() {
        let gate = Arc::new(Semaphore::new(0));
        let f = fixture(FakeDeployer {
            gate: Some(gate.clone()),
            ..FakeDeployer::default()
        });
        f.session.select(&[f.class_file.clone()]).unwrap();
        f.session.start_watching().unwrap();
        f.session.on_file_changed(&f.class_file).unwrap();
        f.session.on_file_changed(&f.class_file).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        f.session.reset();
        gate.add_permits(2);
        settle().await;

        assert_eq!(f.session.status(), SessionStatus::NoSelection);
        assert_eq!(f.session.watch_count(), 0);
        // The queued trailing deploy was dropped with the generation.
        assert_eq!(f.deployer.calls().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_real_file_edit_triggers_deploy() {
        let f = fixture(FakeDeployer::default());
        f.session.select(&[f.class_file.clone()]).unwrap();
        f.session.start_watching().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        fs::write(&f.class_file, "public class A { void m() {} }").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while f.deployer.calls().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(f.deployer.calls(), vec![f.class_file.clone()]);
    }
}
