//! Extraction of the most specific diagnostic line from captured stderr.
//!
//! Package managers and media tools print a lot of noise around the one
//! line that explains a failure. The policy: an explicit error marker wins,
//! then the last non-empty line that is not a notice/warning/progress line.

/// Markers that identify an explicit error line, matched case-insensitively.
const ERROR_MARKERS: [&str; 4] = ["error:", "error ", "exception:", "fatal:"];

/// Prefixes of lines that never explain a failure on their own.
const INFORMATIONAL_PREFIXES: [&str; 8] = [
    "[notice]",
    "notice:",
    "warning:",
    "deprecation:",
    "requirement already satisfied",
    "collecting ",
    "downloading ",
    "using cached",
];

/// True for notice, warning and progress chatter.
pub fn is_informational_line(line: &str) -> bool {
    let lower = line.trim().to_lowercase();
    if lower.is_empty() {
        return true;
    }
    if INFORMATIONAL_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    // Progress bars ("━━━━ 12.3/45.6 MB") and bare percentages
    lower.contains('━') || lower.contains("%|")
}

/// Pick the most specific diagnostic line from a captured stream.
///
/// Returns `None` when the stream holds nothing but whitespace or noise.
pub fn best_diagnostic_line(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let marked = lines.iter().rev().find(|line| {
        let lower = line.to_lowercase();
        ERROR_MARKERS.iter().any(|m| lower.starts_with(m) || lower.contains(&format!(" {m}")))
            || lower.starts_with("error")
    });
    if let Some(line) = marked {
        return Some((*line).to_string());
    }

    lines
        .iter()
        .rev()
        .find(|l| !is_informational_line(l))
        .map(|l| (*l).to_string())
}

/// The last `max` characters of `text`, on a char boundary.
pub fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    text.chars().skip(count - max).collect()
}
