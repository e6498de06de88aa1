//! Transcoding media files to WAV with ffmpeg.

use crate::audit::AuditLog;
use crate::config::{ConvertConfig, SetupConfig, ToolPaths};
use crate::error::{AmvError, Result};
use crate::platform::{run_async_with_timeout, tail_chars};
use crate::separation::is_wav;
use std::path::{Path, PathBuf};
use tracing::info;

/// Converts one file to `<stem>.wav` beside it.
#[derive(Debug, Clone)]
pub struct ConvertJob {
    input: PathBuf,
    program: PathBuf,
    audit: Option<AuditLog>,
}

impl ConvertJob {
    pub fn new(input: impl Into<PathBuf>, tools: &ToolPaths) -> Self {
        Self {
            input: input.into(),
            program: tools.ffmpeg.clone(),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output_path(&self) -> PathBuf {
        self.input.with_extension("wav")
    }

    pub fn build_argv(&self) -> Vec<String> {
        vec![
            self.program.to_string_lossy().to_string(),
            "-i".into(),
            self.input.to_string_lossy().to_string(),
            "-vn".into(),
            "-acodec".into(),
            ConvertConfig::AUDIO_CODEC.into(),
            "-ar".into(),
            ConvertConfig::SAMPLE_RATE.to_string(),
            "-ac".into(),
            ConvertConfig::CHANNELS.to_string(),
            "-y".into(),
            self.output_path().to_string_lossy().to_string(),
        ]
    }

    /// Run ffmpeg and return the written WAV path.
    pub async fn run(&self) -> Result<PathBuf> {
        if !self.input.is_file() {
            return Err(AmvError::FileNotFound(self.input.clone()));
        }
        if is_wav(&self.input) {
            return Err(AmvError::Validation {
                field: "input".into(),
                message: format!("{} is already WAV", self.input.display()),
            });
        }

        let argv = self.build_argv();
        if let Some(audit) = &self.audit {
            audit.command(&argv);
        }

        let output = run_async_with_timeout(&argv, SetupConfig::STEP_TIMEOUT).await?;
        if let Some(audit) = &self.audit {
            audit.command_output(output.code, &output.stdout, &output.stderr);
        }

        let out_path = self.output_path();
        if output.success() && out_path.exists() {
            info!("Converted {} -> {}", self.input.display(), out_path.display());
            return Ok(out_path);
        }

        let tail = tail_chars(output.stderr.trim(), ConvertConfig::ERROR_TAIL_CHARS);
        Err(AmvError::JobFailed {
            message: if tail.is_empty() {
                "Conversion failed: Unknown error".to_string()
            } else {
                format!("Conversion failed: {}", tail)
            },
        })
    }
}
