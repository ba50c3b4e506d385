use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::DeployCommand;
use crate::filters::SelectionFilters;

pub const CONFIG_FILE: &str = "sf-autodeploy.toml";

/// Configuration loaded from `sf-autodeploy.toml` at the project root.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutodeployConfig {
    /// Selections must live under this directory. Relative values are resolved
    /// against the project root; an empty string disables the check.
    pub allowed_root: PathBuf,
    pub deploy: DeployConfig,
    pub watch: WatchConfig,
    /// Extension groups that count as deployable inside watched folders.
    /// When present, replaces the default groups entirely.
    pub filters: SelectionFilters,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DeployConfig {
    pub program: String,
    /// Argument template; `{path}` is replaced by the changed file.
    pub args: Vec<String>,
    /// 0 waits for the deploy indefinitely.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet window a path must reach before its change is reported.
    pub debounce_ms: u64,
    /// How long Deployed/DeployError stays up before reverting to Watching.
    pub display_interval_ms: u64,
}

impl Default for AutodeployConfig {
    fn default() -> Self {
        Self {
            allowed_root: PathBuf::from("force-app/main/default"),
            deploy: DeployConfig::default(),
            watch: WatchConfig::default(),
            filters: SelectionFilters::default(),
        }
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        let DeployCommand { program, args } = DeployCommand::default();
        Self {
            program,
            args,
            timeout_secs: 300,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            display_interval_ms: 3000,
        }
    }
}

impl DeployConfig {
    pub fn command(&self) -> DeployCommand {
        DeployCommand {
            program: self.program.clone(),
            args: self.args.clone(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_millis(self.display_interval_ms)
    }
}

impl AutodeployConfig {
    /// Load configuration from `sf-autodeploy.toml` in the given root directory.
    ///
    /// Returns the default configuration if the file does not exist or cannot be parsed.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!("failed to parse {CONFIG_FILE}: {err}. Using defaults.");
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!("failed to read {CONFIG_FILE}: {err}. Using defaults.");
                Self::default()
            }
        }
    }

    /// The allowed root as an absolute path, or empty when the check is disabled.
    pub fn resolve_allowed_root(&self, project_root: &Path) -> PathBuf {
        if self.allowed_root.as_os_str().is_empty() {
            PathBuf::new()
        } else if self.allowed_root.is_absolute() {
            self.allowed_root.clone()
        } else {
            project_root.join(&self.allowed_root)
        }
    }
}
