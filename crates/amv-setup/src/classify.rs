//! Turning a failed command's output into one user-actionable message.

use amv_core::platform::best_diagnostic_line;
use regex::Regex;
use std::sync::LazyLock;

static WIN_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[WinError (\d+)\]").expect("WinError regex must compile"));

const LOCKED_MESSAGE: &str =
    "Files are in use by another program. Close other Python or AMV windows and retry.";
const DENIED_MESSAGE: &str =
    "Permission denied. Re-run from an elevated terminal or install into a user environment.";

/// Known OS-level failures that the package manager reports verbosely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFailure {
    Locked,
    Denied,
}

impl OsFailure {
    pub fn message(&self) -> &'static str {
        match self {
            OsFailure::Locked => LOCKED_MESSAGE,
            OsFailure::Denied => DENIED_MESSAGE,
        }
    }
}

/// Detect a lock or permission failure anywhere in the text.
pub fn detect_os_failure(text: &str) -> Option<OsFailure> {
    for caps in WIN_ERROR_RE.captures_iter(text) {
        match &caps[1] {
            "32" | "33" => return Some(OsFailure::Locked),
            "5" => return Some(OsFailure::Denied),
            _ => {}
        }
    }

    let lower = text.to_lowercase();
    if lower.contains("being used by another process") || lower.contains("text file busy") {
        Some(OsFailure::Locked)
    } else if lower.contains("access is denied") || lower.contains("permission denied") {
        Some(OsFailure::Denied)
    } else {
        None
    }
}

/// Message for a command that exited with `code`.
///
/// Lock/permission failures map to a fixed hint (with the original line
/// appended). Otherwise the most specific stderr line wins, then stdout,
/// then a generic exit-code message.
pub fn classify_failure(code: Option<i32>, stdout: &str, stderr: &str) -> String {
    let best = best_diagnostic_line(stderr).or_else(|| best_diagnostic_line(stdout));

    if let Some(kind) = detect_os_failure(stderr).or_else(|| detect_os_failure(stdout)) {
        return match best {
            Some(line) => format!("{} ({})", kind.message(), line),
            None => kind.message().to_string(),
        };
    }

    best.unwrap_or_else(|| match code {
        Some(code) => format!("Command exited with code {}", code),
        None => "Command was terminated".to_string(),
    })
}
