use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::json;

use crate::dispatch::DeployOutcome;
use crate::error::{DeployError, DeployErrorKind};
use crate::status::{NoticeLevel, Notifier, SessionStatus, StatusSink};

/// Renders session transitions and notices in a terminal.
///
/// - `json = false`: status-bar style lines on stdout, notices through `tracing`.
/// - `json = true`: one JSON object per line on stdout for both.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPresenter {
    json: bool,
}

impl TerminalPresenter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    fn emit(&self, value: serde_json::Value) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{value}");
        let _ = stdout.flush();
    }
}

/// Status-bar text for a status, e.g. `Watching (2 items)`.
pub fn status_line(status: SessionStatus, item_count: usize) -> String {
    match status {
        SessionStatus::NoSelection => status.label().to_owned(),
        _ if item_count == 1 => format!("{} (1 item)", status.label()),
        _ => format!("{} ({item_count} items)", status.label()),
    }
}

impl StatusSink for TerminalPresenter {
    fn on_status_changed(&self, status: SessionStatus, item_count: usize) {
        if self.json {
            self.emit(json!({
                "event": "status",
                "status": status,
                "items": item_count,
            }));
        } else {
            println!("[sf-autodeploy] {}", status_line(status, item_count));
        }
    }
}

impl Notifier for TerminalPresenter {
    fn notify(&self, level: NoticeLevel, message: &str) {
        if self.json {
            self.emit(json!({
                "event": "notice",
                "level": level,
                "message": message,
            }));
            return;
        }
        match level {
            NoticeLevel::Info => tracing::info!("{message}"),
            NoticeLevel::Warning => tracing::warn!("{message}"),
            NoticeLevel::Error => tracing::error!("{message}"),
        }
    }
}

/// Result of checking a selection against the allowed root.
#[derive(Debug, Serialize)]
pub struct SelectionReport {
    pub allowed_root: PathBuf,
    pub accepted: Vec<PathBuf>,
    pub rejected: Vec<PathBuf>,
}

/// Print a selection report.
///
/// Rejected paths go to **stderr** in human mode so stdout lists only
/// accepted paths.
pub fn print_selection_report(report: &SelectionReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("error serialising report: {}", e),
        }
        return;
    }

    let root = if report.allowed_root.as_os_str().is_empty() {
        "(no restriction)".to_owned()
    } else {
        report.allowed_root.display().to_string()
    };
    println!("Allowed root: {root}");
    for path in &report.accepted {
        println!("  ok       {}", path.display());
    }
    for path in &report.rejected {
        eprintln!("  rejected {}", path.display());
    }
    println!(
        "{} accepted, {} rejected",
        report.accepted.len(),
        report.rejected.len()
    );
}

#[derive(Debug, Serialize)]
struct DeployFailure<'a> {
    path: &'a std::path::Path,
    kind: DeployErrorKind,
    message: String,
}

/// Print the result of a one-shot deploy. Captured process output is echoed
/// so the deploy CLI's own report stays visible.
pub fn print_deploy_result(result: &Result<DeployOutcome, DeployError>, json: bool) {
    match (result, json) {
        (Ok(outcome), true) => match serde_json::to_string_pretty(outcome) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("error serialising outcome: {}", e),
        },
        (Err(err), true) => {
            let failure = DeployFailure {
                path: err.path(),
                kind: err.kind(),
                message: err.to_string(),
            };
            match serde_json::to_string_pretty(&failure) {
                Ok(s) => println!("{}", s),
                Err(e) => eprintln!("error serialising failure: {}", e),
            }
        }
        (Ok(outcome), false) => {
            print!("{}", outcome.stdout);
            eprint!("{}", outcome.stderr);
            println!(
                "Deployed {} in {:.2}s",
                outcome.path.display(),
                outcome.elapsed.as_secs_f64()
            );
        }
        (Err(err), false) => {
            eprintln!("error: {err}");
        }
    }
}
