//! Per-path deploy serialization.
//!
//! Each path has at most one deploy in flight. Triggers that arrive while a
//! deploy is running collapse into a single trailing deploy, which starts as
//! soon as the running one completes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    InFlight,
    /// In flight, with one trailing deploy queued behind it.
    Pending,
}

/// What the caller should do with a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// No deploy was running for the path: start one now.
    Start,
    /// A deploy is already running: the trigger was folded into the trailing deploy.
    Coalesced,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: SlotState,
    /// Session generation the running (or queued) deploy belongs to.
    generation: u64,
}

#[derive(Debug, Default)]
pub struct DeployScheduler {
    slots: Mutex<HashMap<PathBuf, Slot>>,
}

impl DeployScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trigger for `path` raised under `generation`. A coalesced
    /// trigger restamps the slot, since its trailing deploy runs for the
    /// newer generation.
    pub fn request(&self, path: &Path, generation: u64) -> Request {
        let mut slots = self.slots.lock();
        match slots.get(path).map(|slot| slot.state) {
            None | Some(SlotState::Idle) => {
                slots.insert(
                    path.to_path_buf(),
                    Slot {
                        state: SlotState::InFlight,
                        generation,
                    },
                );
                Request::Start
            }
            Some(SlotState::InFlight | SlotState::Pending) => {
                slots.insert(
                    path.to_path_buf(),
                    Slot {
                        state: SlotState::Pending,
                        generation,
                    },
                );
                Request::Coalesced
            }
        }
    }

    /// Mark the running deploy for `path` as finished.
    ///
    /// Returns true when a trailing deploy was queued; the slot then stays
    /// `InFlight` under `generation` and the caller must start that deploy
    /// (or `release` it).
    pub fn complete(&self, path: &Path, generation: u64) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(path).map(|slot| slot.state) {
            Some(SlotState::Pending) => {
                slots.insert(
                    path.to_path_buf(),
                    Slot {
                        state: SlotState::InFlight,
                        generation,
                    },
                );
                true
            }
            _ => {
                slots.remove(path);
                false
            }
        }
    }

    /// Drop whatever is tracked for `path`.
    pub fn release(&self, path: &Path) {
        self.slots.lock().remove(path);
    }

    pub fn state(&self, path: &Path) -> SlotState {
        self.slots
            .lock()
            .get(path)
            .map(|slot| slot.state)
            .unwrap_or(SlotState::Idle)
    }

    /// Number of paths with a deploy in flight for `generation`. Deploys left
    /// over from an older generation are not counted.
    pub fn in_flight(&self, generation: u64) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.generation == generation)
            .count()
    }
}
