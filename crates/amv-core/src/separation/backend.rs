//! Separation backends.
//!
//! The ML library is a black box behind [`SeparationBackend`]. The shipped
//! backend drives the `audio-separator` command; its progress-bar stream is
//! handed chunk by chunk to the caller's diagnostics callback.

use crate::config::ToolPaths;
use crate::error::{AmvError, Result};
use crate::models::{ModelSpec, RuntimeSettings};
use crate::platform::best_diagnostic_line;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Everything a backend needs for one run.
#[derive(Debug, Clone)]
pub struct SeparationRequest {
    /// Padded or original input.
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub model_dir: PathBuf,
    pub model: ModelSpec,
    pub settings: RuntimeSettings,
}

/// A separation engine.
pub trait SeparationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Run one separation. `diagnostics` receives the raw diagnostic stream
    /// in chunks as it arrives. Returns the produced files.
    fn separate(&self, request: &SeparationRequest, diagnostics: &mut dyn FnMut(&[u8])) -> Result<Vec<PathBuf>>;

    /// Free accelerator memory. Safe to call at any time, including after
    /// a failed or never-started run.
    fn release_resources(&self);
}

/// Maximum diagnostic text kept for error classification.
const DIAGNOSTIC_KEEP_BYTES: usize = 64 * 1024;

/// Backend running the `audio-separator` command line tool.
pub struct AudioSeparatorCli {
    program: PathBuf,
    child: Mutex<Option<Child>>,
}

impl AudioSeparatorCli {
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            program: tools.audio_separator.clone(),
            child: Mutex::new(None),
        }
    }

    /// Arguments for one run; batch and precision flags only when the
    /// resolved settings ask for them.
    pub fn build_args(request: &SeparationRequest) -> Vec<String> {
        let mut args = vec![
            request.input.to_string_lossy().to_string(),
            "--model_filename".to_string(),
            request.model.id.to_string(),
            "--model_file_dir".to_string(),
            request.model_dir.to_string_lossy().to_string(),
            "--output_dir".to_string(),
            request.output_dir.to_string_lossy().to_string(),
            "--log_level".to_string(),
            "error".to_string(),
        ];
        if request.settings.fp16 {
            args.push("--use_autocast".to_string());
        }
        if request.settings.batch_size > 1 {
            let batch = request.settings.batch_size.to_string();
            args.extend([
                "--mdx_batch_size".to_string(),
                batch.clone(),
                "--vr_batch_size".to_string(),
                batch,
            ]);
        }
        args
    }

    fn lock_child(&self) -> std::sync::MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SeparationBackend for AudioSeparatorCli {
    fn name(&self) -> &str {
        "audio-separator"
    }

    fn separate(&self, request: &SeparationRequest, diagnostics: &mut dyn FnMut(&[u8])) -> Result<Vec<PathBuf>> {
        let stem = file_stem(&request.input);
        let before = snapshot_dir(&request.output_dir);
        let started = SystemTime::now();

        let args = Self::build_args(request);
        info!("Running {} with model {}", self.name(), request.model.id);
        debug!("{} {:?}", self.program.display(), args);

        let tool = ToolPaths::tool_name(&self.program);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AmvError::ToolNotFound { tool: tool.clone() },
                _ => AmvError::ToolFailed {
                    tool: tool.clone(),
                    message: e.to_string(),
                },
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        *self.lock_child() = Some(child);

        let stdout_thread = stdout.map(|mut out| {
            std::thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = out.read_to_end(&mut buf);
                buf
            })
        });

        let mut kept: Vec<u8> = Vec::new();
        if let Some(mut err) = stderr {
            let mut chunk = [0u8; 4096];
            loop {
                match err.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        diagnostics(&chunk[..n]);
                        kept.extend_from_slice(&chunk[..n]);
                        if kept.len() > DIAGNOSTIC_KEEP_BYTES {
                            kept.drain(..kept.len() - DIAGNOSTIC_KEEP_BYTES);
                        }
                    }
                    Err(e) => {
                        debug!("Diagnostic stream read failed: {}", e);
                        break;
                    }
                }
            }
        }

        let status = {
            let mut guard = self.lock_child();
            match guard.as_mut() {
                Some(child) => Some(child.wait()?),
                None => None,
            }
        };
        *self.lock_child() = None;

        let stdout_text = stdout_thread
            .and_then(|h| h.join().ok())
            .map(|b| String::from_utf8_lossy(&b).to_string())
            .unwrap_or_default();

        let status = status.ok_or_else(|| AmvError::JobFailed {
            message: "Separation process was stopped".into(),
        })?;
        if !status.success() {
            let stderr_text = String::from_utf8_lossy(&kept);
            let message = best_diagnostic_line(&stderr_text)
                .or_else(|| best_diagnostic_line(&stdout_text))
                .unwrap_or_else(|| format!("{} exited with {:?}", tool, status.code()));
            return Err(AmvError::JobFailed { message });
        }

        let produced = new_outputs(&request.output_dir, &stem, &before, started);
        debug!("{} produced {} file(s)", self.name(), produced.len());
        Ok(produced)
    }

    fn release_resources(&self) {
        let mut guard = self.lock_child();
        if let Some(mut child) = guard.take() {
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    warn!("Stopping leftover separation process {}", child.id());
                    let _ = child.kill();
                    let _ = child.wait();
                }
            }
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn snapshot_dir(dir: &Path) -> HashSet<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}

/// Files starting with `stem` that are new, or were rewritten since `since`.
/// The input itself is excluded.
pub fn new_outputs(dir: &Path, stem: &str, before: &HashSet<PathBuf>, since: SystemTime) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| {
                    let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                    name.starts_with(stem) && file_stem(p) != stem
                })
                .filter(|p| {
                    !before.contains(p)
                        || std::fs::metadata(p)
                            .and_then(|m| m.modified())
                            .map(|m| m >= since)
                            .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default();
    found.sort();
    found
}
