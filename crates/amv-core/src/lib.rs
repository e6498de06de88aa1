//! AMV Core - hardware-aware media processing for the AMV toolkit.
//!
//! Detects CPU/GPU capability, picks a separation model to match, persists
//! the user's execution mode, normalizes progress output from external
//! tools, and runs separation, download and conversion jobs.
//!
//! Switching the machine between CPU and GPU runtimes lives in the
//! `amv-setup` crate.
//!
//! # Example
//!
//! ```rust,no_run
//! use amv_core::Toolkit;
//!
//! fn main() -> amv_core::Result<()> {
//!     let toolkit = Toolkit::discover(None)?;
//!     let capability = toolkit.probe().probe();
//!     let (model, settings) = amv_core::models::select(&capability);
//!     println!("{} -> {} (fp16={})", capability, model.display_name, settings.fp16);
//!     Ok(())
//! }
//! ```

pub mod atomic;
pub mod audit;
pub mod cancel;
pub mod config;
pub mod error;
pub mod media;
pub mod mode;
pub mod models;
pub mod platform;
pub mod progress;
pub mod separation;
pub mod system;

pub use audit::AuditLog;
pub use cancel::{CancellationToken, CancelledError};
pub use config::{AppPaths, ToolPaths};
pub use error::{AmvError, Result};
pub use mode::{LoadedMode, ModeRecord, ModeStore, SetupType};
pub use models::{ModelSpec, RuntimeSettings};
pub use progress::{ProgressEvent, ProgressSender, Stage};
pub use system::{CapabilityDescriptor, CapabilityProbe, DeviceKind, RuntimeStatus};

use separation::{AudioSeparatorCli, MediaEditor, SeparationJob};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Shared handles for one session: paths, tools, the capability cache, the
/// mode store and the audit log.
pub struct Toolkit {
    paths: AppPaths,
    tools: ToolPaths,
    probe: Arc<CapabilityProbe>,
    store: ModeStore,
    audit: AuditLog,
}

impl Toolkit {
    /// Build from explicit paths and tools.
    ///
    /// Loads (and migrates) the mode record so the probe honors `force_cpu`.
    pub fn new(paths: AppPaths, tools: ToolPaths) -> Result<Self> {
        paths.ensure_dirs()?;
        let store = ModeStore::new(paths.config_file());
        let record = store.load_and_migrate()?;
        let probe = Arc::new(CapabilityProbe::from_tools(&tools).with_force_cpu(record.force_cpu));
        let audit = AuditLog::new(paths.logs_dir());
        debug!("Toolkit rooted at {}", paths.root.display());
        Ok(Self {
            paths,
            tools,
            probe,
            store,
            audit,
        })
    }

    /// Resolve paths from `root`, `AMV_HOME` or the platform data dir.
    pub fn discover(root: Option<PathBuf>) -> Result<Self> {
        Self::new(AppPaths::discover(root)?, ToolPaths::default())
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    pub fn probe(&self) -> &Arc<CapabilityProbe> {
        &self.probe
    }

    pub fn store(&self) -> &ModeStore {
        &self.store
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Current persisted mode, normalized.
    pub fn mode(&self) -> ModeRecord {
        self.store.load().record
    }

    /// Separation job for `input` wired to the real backend and editor.
    pub fn separation_job(&self, input: impl Into<PathBuf>) -> SeparationJob {
        SeparationJob::new(
            input,
            self.probe.probe(),
            Arc::new(AudioSeparatorCli::new(&self.tools)),
            Arc::new(MediaEditor::new(&self.tools)),
        )
        .with_model_dir(self.paths.models_dir())
        .with_diagnostics_log(self.paths.separator_log())
    }
}
