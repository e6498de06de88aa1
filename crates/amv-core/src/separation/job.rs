//! One separation run from input file to named outputs.
//!
//! ```text
//! Pending -> [Padding] -> Loading -> Processing -> Finalizing -> Succeeded
//!                                                             \-> Failed
//! ```
//!
//! Cleanup (temp file removal, leftover library outputs, accelerator memory)
//! runs whatever the outcome. Cancellation is honored only between phases.
//! The run is synchronous; async callers wrap it in `spawn_blocking`.

use crate::cancel::CancellationToken;
use crate::config::SeparationConfig;
use crate::error::{AmvError, Result};
use crate::models::{self, ModelSpec, RuntimeSettings};
use crate::progress::{emit, MarkerScanAdapter, ProgressAdapter, ProgressEvent, ProgressSender, Stage};
use crate::separation::audio::AudioEditor;
use crate::separation::backend::{SeparationBackend, SeparationRequest};
use crate::separation::naming::{
    backup_path, build_output_name, claim_unique_path, classify_role, clean_stem, is_backup_stem, ArtifactRole,
};
use crate::system::CapabilityDescriptor;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tracing::{debug, error, info, warn};

/// Lifecycle phase of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Pending,
    Padding,
    Loading,
    Processing,
    Finalizing,
    Succeeded,
    Failed,
}

/// A finalized output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeparationArtifact {
    pub role: ArtifactRole,
    pub path: PathBuf,
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SeparationOutcome {
    pub model: ModelSpec,
    pub settings: RuntimeSettings,
    pub artifacts: Vec<SeparationArtifact>,
    /// Where the original input was moved, if it was backed up by this run.
    pub backup: Option<PathBuf>,
    pub padded: bool,
}

/// Files the job owns until it finishes.
#[derive(Debug, Default)]
struct Scratch {
    temp_input: Option<TempPath>,
    raw_outputs: Vec<PathBuf>,
}

/// A library output and the reserved (empty placeholder) file it will replace.
#[derive(Debug)]
struct Placement {
    raw: PathBuf,
    role: ArtifactRole,
    dest: PathBuf,
}

pub struct SeparationJob {
    input: PathBuf,
    descriptor: Arc<CapabilityDescriptor>,
    backend: Arc<dyn SeparationBackend>,
    editor: Arc<dyn AudioEditor>,
    model_dir: PathBuf,
    diagnostics_log: Option<PathBuf>,
    cancel: CancellationToken,
    progress: Option<ProgressSender>,
    phases: Vec<JobPhase>,
}

impl SeparationJob {
    pub fn new(
        input: impl Into<PathBuf>,
        descriptor: Arc<CapabilityDescriptor>,
        backend: Arc<dyn SeparationBackend>,
        editor: Arc<dyn AudioEditor>,
    ) -> Self {
        Self {
            input: input.into(),
            descriptor,
            backend,
            editor,
            model_dir: PathBuf::from("models"),
            diagnostics_log: None,
            cancel: CancellationToken::new(),
            progress: None,
            phases: vec![JobPhase::Pending],
        }
    }

    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    /// Append the library's raw diagnostic stream to this file.
    pub fn with_diagnostics_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.diagnostics_log = Some(path.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Current phase.
    pub fn phase(&self) -> JobPhase {
        self.phases.last().copied().unwrap_or(JobPhase::Pending)
    }

    /// Every phase entered so far, in order.
    pub fn phases(&self) -> &[JobPhase] {
        &self.phases
    }

    /// Run to completion. Cleanup happens before this returns, on every path.
    pub fn run(&mut self) -> Result<SeparationOutcome> {
        let mut scratch = Scratch::default();
        let result = self.run_phases(&mut scratch);

        self.cleanup(scratch);

        match &result {
            Ok(outcome) => {
                self.enter(JobPhase::Succeeded);
                info!(
                    "Separated {} into {} file(s)",
                    self.input.display(),
                    outcome.artifacts.len()
                );
                emit(
                    self.progress.as_ref(),
                    ProgressEvent::new(Stage::Finalizing, 100, "Separation complete"),
                );
            }
            Err(e) if e.is_cancelled() => {
                self.enter(JobPhase::Failed);
                info!("Separation of {} cancelled", self.input.display());
            }
            Err(e) => {
                self.enter(JobPhase::Failed);
                error!("Separation of {} failed: {}", self.input.display(), e);
            }
        }
        result
    }

    fn enter(&mut self, phase: JobPhase) {
        debug!("Separation job: {:?} -> {:?}", self.phase(), phase);
        self.phases.push(phase);
    }

    fn run_phases(&mut self, scratch: &mut Scratch) -> Result<SeparationOutcome> {
        if !self.input.is_file() {
            return Err(AmvError::FileNotFound(self.input.clone()));
        }
        let input = self.input.clone();
        let input_dir = input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let input_stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        self.cancel.check()?;

        // Padding
        let mut processing_input = input.clone();
        let mut original_duration: Option<Duration> = None;
        if self.editor.is_available(&input) {
            match self.editor.duration(&input) {
                Ok(duration) if duration < SeparationConfig::DURATION_FLOOR => {
                    self.enter(JobPhase::Padding);
                    let total = SeparationConfig::DURATION_FLOOR + SeparationConfig::PAD_MARGIN;
                    match self.pad_input(&input, &input_dir, &input_stem, total) {
                        Ok(temp) => {
                            debug!("Padded {:?} input to {:?}", duration, total);
                            processing_input = temp.to_path_buf();
                            original_duration = Some(duration);
                            scratch.temp_input = Some(temp);
                        }
                        Err(e) => warn!("Padding failed, separating unpadded input: {}", e),
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Could not read duration of {}: {}", input.display(), e),
            }
        } else {
            debug!("No audio editor for {}, skipping padding", input.display());
        }

        self.cancel.check()?;

        // Loading
        self.enter(JobPhase::Loading);
        let (model, settings) = models::select(&self.descriptor);
        info!(
            "Model {} (fp16={}, batch={}) on {}",
            model.display_name, settings.fp16, settings.batch_size, self.descriptor.device_name
        );
        emit(
            self.progress.as_ref(),
            ProgressEvent::indeterminate(Stage::Loading, "Loading AI model..."),
        );
        let request = SeparationRequest {
            input: processing_input,
            output_dir: input_dir.clone(),
            model_dir: self.model_dir.clone(),
            model,
            settings,
        };

        self.cancel.check()?;

        // Processing
        self.enter(JobPhase::Processing);
        emit(
            self.progress.as_ref(),
            ProgressEvent::new(Stage::Processing, 0, "Starting separation..."),
        );
        let mut adapter = MarkerScanAdapter::new(self.diagnostics_sink());
        let progress = self.progress.clone();
        let produced = self.backend.separate(&request, &mut |chunk: &[u8]| {
            if let Some(event) = adapter.feed(chunk) {
                emit(progress.as_ref(), event);
            }
        })?;
        drop(adapter.into_inner());
        scratch.raw_outputs = produced.clone();

        if produced.is_empty() {
            return Err(AmvError::JobFailed {
                message: "Separation produced no output files".into(),
            });
        }

        self.cancel.check()?;

        // Finalizing
        self.enter(JobPhase::Finalizing);
        emit(
            self.progress.as_ref(),
            ProgressEvent::indeterminate(Stage::Finalizing, "Finalizing outputs..."),
        );

        if let Some(length) = original_duration {
            for artifact in produced.iter().filter(|p| p.exists()) {
                if self.editor.is_available(artifact) {
                    self.editor.truncate(artifact, length)?;
                } else {
                    warn!("Cannot trim {}, leaving padded length", artifact.display());
                }
            }
        }

        // Every destination is reserved before anything is moved, so a
        // naming failure leaves the input and the library outputs as they were.
        let placements = reserve_destinations(&input_dir, &clean_stem(&input_stem), &produced)?;
        let backup = self.backup_original(&input, &input_stem);

        let mut artifacts = Vec::with_capacity(placements.len());
        for (i, placement) in placements.iter().enumerate() {
            if let Err(e) = std::fs::rename(&placement.raw, &placement.dest) {
                roll_back(&placements[..i], &placements[i..], backup.as_deref(), &input);
                return Err(AmvError::io("Failed to move output to", &placement.dest, e));
            }
            debug!("{} -> {}", placement.raw.display(), placement.dest.display());
            artifacts.push(SeparationArtifact {
                role: placement.role,
                path: placement.dest.clone(),
            });
        }
        scratch
            .raw_outputs
            .retain(|raw| !placements.iter().any(|p| &p.raw == raw));

        Ok(SeparationOutcome {
            model,
            settings,
            artifacts,
            backup,
            padded: original_duration.is_some(),
        })
    }

    /// Write a padded copy of `input` to a fresh temp file beside it. The
    /// name is random, so no existing file is ever opened for writing.
    fn pad_input(&self, input: &Path, dir: &Path, stem: &str, total: Duration) -> Result<TempPath> {
        let temp = tempfile::Builder::new()
            .prefix(&format!("{}{}.", SeparationConfig::TEMP_PREFIX, stem))
            .suffix(&format!(".{}", SeparationConfig::DEFAULT_EXTENSION))
            .tempfile_in(dir)
            .map_err(|e| AmvError::io("Failed to create temp file in", dir, e))?
            .into_temp_path();
        self.editor.pad_with_silence(input, &temp, total)?;
        Ok(temp)
    }

    /// Move the input to `{stem} (original){ext}` unless it already is a
    /// backup or a backup already exists.
    fn backup_original(&self, input: &Path, stem: &str) -> Option<PathBuf> {
        if is_backup_stem(stem) {
            return None;
        }
        let backup = backup_path(input);
        if backup.exists() {
            debug!("Backup {} already exists", backup.display());
            return None;
        }
        match std::fs::rename(input, &backup) {
            Ok(()) => Some(backup),
            Err(e) => {
                warn!("Could not back up {}: {}", input.display(), e);
                None
            }
        }
    }

    fn diagnostics_sink(&self) -> Box<dyn Write + Send> {
        let Some(path) = &self.diagnostics_log else {
            return Box::new(std::io::sink());
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Box::new(file),
            Err(e) => {
                warn!("Cannot open diagnostics log {}: {}", path.display(), e);
                Box::new(std::io::sink())
            }
        }
    }

    fn cleanup(&self, scratch: Scratch) {
        if let Some(temp) = scratch.temp_input {
            let shown = temp.display().to_string();
            if let Err(e) = temp.close() {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", shown, e);
                }
            }
        }
        for raw in &scratch.raw_outputs {
            if raw.exists() {
                debug!("Removing unfinished output {}", raw.display());
                let _ = std::fs::remove_file(raw);
            }
        }
        self.backend.release_resources();
    }
}

/// Claim a final name for every output that exists. On failure the
/// placeholders claimed so far are removed again.
fn reserve_destinations(dir: &Path, stem: &str, produced: &[PathBuf]) -> Result<Vec<Placement>> {
    let mut placements: Vec<Placement> = Vec::with_capacity(produced.len());
    for raw in produced.iter().filter(|p| p.exists()) {
        let library_name = raw
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let role = classify_role(&library_name);
        let target = dir.join(build_output_name(stem, role.marker(), &library_name));
        match claim_unique_path(&target) {
            Ok(dest) => placements.push(Placement {
                raw: raw.clone(),
                role,
                dest,
            }),
            Err(e) => {
                remove_placeholders(&placements);
                return Err(e);
            }
        }
    }
    Ok(placements)
}

/// Undo a partial finalize: moved outputs go back to their library names
/// (cleanup then deletes them), unused placeholders are removed and the
/// backup is renamed back to the input.
fn roll_back(moved: &[Placement], pending: &[Placement], backup: Option<&Path>, input: &Path) {
    for placement in moved {
        if let Err(e) = std::fs::rename(&placement.dest, &placement.raw) {
            warn!("Could not undo move of {}: {}", placement.dest.display(), e);
        }
    }
    remove_placeholders(pending);
    if let Some(backup) = backup {
        if let Err(e) = std::fs::rename(backup, input) {
            warn!("Could not restore {} from {}: {}", input.display(), backup.display(), e);
        }
    }
}

fn remove_placeholders(placements: &[Placement]) {
    for placement in placements {
        let _ = std::fs::remove_file(&placement.dest);
    }
}
