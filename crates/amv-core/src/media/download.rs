//! Video/audio downloads through yt-dlp.

use crate::audit::AuditLog;
use crate::config::{DownloadConfig, ToolPaths};
use crate::error::{AmvError, Result};
use crate::platform::best_diagnostic_line;
use crate::progress::{emit, LineSplitAdapter, ProgressAdapter, ProgressEvent, ProgressSender, Stage};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// What to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    Audio,
    Video,
}

/// A finished download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadOutcome {
    pub title: String,
    pub output_dir: PathBuf,
}

/// One yt-dlp invocation.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    url: String,
    mode: DownloadMode,
    output_dir: PathBuf,
    program: PathBuf,
    audit: Option<AuditLog>,
    progress: Option<ProgressSender>,
}

/// Trim whitespace and surrounding quotes from a pasted URL.
pub fn normalize_url(raw: &str) -> Result<String> {
    let url = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if url.is_empty() {
        return Err(AmvError::Validation {
            field: "url".into(),
            message: "URL is empty".into(),
        });
    }
    Ok(url.to_string())
}

impl DownloadJob {
    pub fn new(url: &str, mode: DownloadMode, output_dir: impl Into<PathBuf>, tools: &ToolPaths) -> Result<Self> {
        Ok(Self {
            url: normalize_url(url)?,
            mode,
            output_dir: output_dir.into(),
            program: tools.yt_dlp.clone(),
            audit: None,
            progress: None,
        })
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Full argument list, excluding the program.
    pub fn build_args(&self) -> Vec<String> {
        let template = self.output_dir.join(DownloadConfig::OUTPUT_TEMPLATE);
        let mut args: Vec<String> = match self.mode {
            DownloadMode::Audio => vec![
                "-x".into(),
                "--audio-format".into(),
                DownloadConfig::AUDIO_FORMAT.into(),
                "--audio-quality".into(),
                "0".into(),
            ],
            DownloadMode::Video => vec!["-f".into(), DownloadConfig::VIDEO_FORMAT.into()],
        };
        args.extend([
            "--newline".into(),
            "--progress".into(),
            "-o".into(),
            template.to_string_lossy().to_string(),
            self.url.clone(),
        ]);
        args
    }

    fn adapter(&self) -> LineSplitAdapter {
        match self.mode {
            DownloadMode::Audio => LineSplitAdapter::for_audio(),
            DownloadMode::Video => LineSplitAdapter::for_video(),
        }
    }

    fn audit_line(&self, line: &str) {
        if let Some(audit) = &self.audit {
            audit.append(line);
        }
    }

    /// Run the download to completion.
    pub async fn run(&self) -> Result<DownloadOutcome> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| AmvError::io("Failed to create", &self.output_dir, e))?;

        let args = self.build_args();
        let tool = ToolPaths::tool_name(&self.program);
        if let Some(audit) = &self.audit {
            let mut argv = vec![self.program.to_string_lossy().to_string()];
            argv.extend(args.iter().cloned());
            audit.command(&argv);
        }
        info!("Downloading {} ({:?}) into {}", self.url, self.mode, self.output_dir.display());

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AmvError::ToolNotFound { tool: tool.clone() },
                _ => AmvError::ToolFailed {
                    tool: tool.clone(),
                    message: e.to_string(),
                },
            })?;

        // Progress and destinations arrive on stdout; stderr carries warnings
        // and errors and is read alongside so neither pipe can fill up.
        let stderr_task = child.stderr.take().map(|mut err| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = err.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).to_string()
            })
        });

        let mut adapter = self.adapter();
        if let Some(mut out) = child.stdout.take() {
            let mut chunk = [0u8; 4096];
            loop {
                let n = match out.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        debug!("Downloader stdout read failed: {}", e);
                        break;
                    }
                };
                for byte in &chunk[..n] {
                    if let Some(event) = adapter.feed(std::slice::from_ref(byte)) {
                        emit(self.progress.as_ref(), event);
                    }
                }
                for line in adapter.drain_lines() {
                    self.audit_line(&line);
                }
            }
        }
        if let Some(event) = adapter.finish() {
            emit(self.progress.as_ref(), event);
        }
        for line in adapter.drain_lines() {
            self.audit_line(&line);
        }

        let status = child.wait().await.map_err(|e| AmvError::ToolFailed {
            tool: tool.clone(),
            message: e.to_string(),
        })?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            self.audit_line(line);
        }
        if let Some(audit) = &self.audit {
            audit.append(&format!("exit={}", status.code().map(|c| c.to_string()).unwrap_or_else(|| "none".into())));
        }

        if !status.success() {
            let message = best_diagnostic_line(&stderr).unwrap_or_else(|| "Download failed!".to_string());
            warn!("{} exited with {:?}: {}", tool, status.code(), message);
            return Err(AmvError::JobFailed { message });
        }

        for stream in adapter.streams() {
            emit(
                self.progress.as_ref(),
                ProgressEvent::new(Stage::Downloading { stream }, 100, format!("Downloading {}: 100%", stream)),
            );
        }

        let title = adapter.title().unwrap_or("Download").to_string();
        info!("Downloaded {}", title);
        Ok(DownloadOutcome {
            title,
            output_dir: self.output_dir.clone(),
        })
    }
}
