use serde::Serialize;

/// Where the watch session currently is. Exactly one value is live at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NoSelection,
    Selected,
    Watching,
    Deploying,
    Deployed,
    DeployError,
}

impl SessionStatus {
    /// True for every state in which the filesystem watches are live.
    pub fn is_watching(self) -> bool {
        matches!(
            self,
            Self::Watching | Self::Deploying | Self::Deployed | Self::DeployError
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NoSelection => "No selection",
            Self::Selected => "Selected",
            Self::Watching => "Watching",
            Self::Deploying => "Deploying",
            Self::Deployed => "Deployed",
            Self::DeployError => "Deploy error",
        }
    }
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Receives every status transition of a session.
///
/// Called while the session lock is held: implementations must return quickly
/// and must not call back into the session.
pub trait StatusSink: Send + Sync {
    fn on_status_changed(&self, status: SessionStatus, item_count: usize);
}

/// Receives user-facing notices. Same locking rules as [`StatusSink`].
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);
}
