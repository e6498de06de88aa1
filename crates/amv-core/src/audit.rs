//! Append-only audit log of external commands and their output.
//!
//! One plain-text file per local calendar day. Every write reopens the file in
//! append mode, so concurrent workflows interleave whole lines and nothing is
//! ever truncated. Audit failures are logged and swallowed: losing an audit
//! line must never fail the operation being audited.

use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Daily audit log rooted at a logs directory.
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    /// Create an audit log writing `amv-YYYY-MM-DD.log` files under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file that receives writes made at `at`.
    pub fn file_for(&self, at: DateTime<Local>) -> PathBuf {
        self.dir
            .join(format!("amv-{}.log", at.format("%Y-%m-%d")))
    }

    /// Path of today's file.
    pub fn current_file(&self) -> PathBuf {
        self.file_for(Local::now())
    }

    /// Append one timestamped entry. Multi-line text is indented under the stamp.
    pub fn append(&self, text: &str) {
        let now = Local::now();
        let mut entry = format!("[{}] ", now.format("%Y-%m-%d %H:%M:%S"));
        let mut lines = text.lines();
        entry.push_str(lines.next().unwrap_or(""));
        entry.push('\n');
        for line in lines {
            entry.push_str("    ");
            entry.push_str(line);
            entry.push('\n');
        }

        if let Err(e) = self.write_raw(&self.file_for(now), entry.as_bytes()) {
            warn!("Failed to append to audit log in {}: {}", self.dir.display(), e);
        }
    }

    /// Record a command invocation.
    pub fn command(&self, argv: &[String]) {
        self.append(&format!("$ {}", format_argv(argv)));
    }

    /// Record a finished command with its captured streams.
    pub fn command_output(&self, exit: Option<i32>, stdout: &str, stderr: &str) {
        let code = exit
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        let mut text = format!("exit={}", code);
        if !stdout.trim().is_empty() {
            text.push_str("\n--- stdout ---\n");
            text.push_str(stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            text.push_str("\n--- stderr ---\n");
            text.push_str(stderr.trim_end());
        }
        self.append(&text);
    }

    fn write_raw(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(bytes)
    }
}

/// Render an argument vector for logs, quoting arguments that contain spaces.
pub fn format_argv(argv: &[String]) -> String {
    argv.iter()
        .map(|a| {
            if a.is_empty() || a.contains(char::is_whitespace) {
                format!("\"{}\"", a)
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
