//! Centralized configuration for the AMV toolkit.
//!
//! Tuning constants live on zero-sized structs grouped by workflow. Paths are
//! resolved once at startup into [`AppPaths`] and [`ToolPaths`].

use crate::error::{AmvError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const DATA_DIR_NAME: &'static str = "amv-toolkit";
    pub const HOME_ENV: &'static str = "AMV_HOME";
    pub const ORIGINAL_DIR_ENV: &'static str = "AMV_ORIGINAL_DIR";
    pub const PYTHON_ENV: &'static str = "AMV_PYTHON";
}

/// Separation job tuning.
pub struct SeparationConfig;

impl SeparationConfig {
    /// Inputs shorter than this are padded before separation.
    pub const DURATION_FLOOR: Duration = Duration::from_secs(10);
    /// Extra silence added past the floor.
    pub const PAD_MARGIN: Duration = Duration::from_secs(1);
    /// Upper bound on `(n)` suffixes tried before giving up.
    pub const MAX_NAME_ATTEMPTS: u32 = 1000;
    pub const BACKUP_MARKER: &'static str = " (original)";
    pub const VOCALS_MARKER: &'static str = "[vocals]";
    pub const INSTRUMENTAL_MARKER: &'static str = "[instrumental]";
    pub const DEFAULT_EXTENSION: &'static str = "wav";
    pub const TEMP_PREFIX: &'static str = "temp_";
}

/// Runtime switching and dependency installation.
pub struct SetupConfig;

impl SetupConfig {
    /// Per-step limit for package manager commands; wheels for CUDA builds are large.
    pub const STEP_TIMEOUT: Duration = Duration::from_secs(600);
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const QUICK_TIMEOUT: Duration = Duration::from_secs(5);
    pub const CPU_INDEX_URL: &'static str = "https://download.pytorch.org/whl/cpu";
    pub const GPU_INDEX_URL: &'static str = "https://download.pytorch.org/whl/cu128";
    pub const RUNTIME_PACKAGES: [&'static str; 3] = ["torch", "torchvision", "torchaudio"];
    pub const CPU_BACKEND_PACKAGES: [&'static str; 2] = ["onnxruntime", "audio-separator"];
    pub const GPU_BACKEND_PACKAGES: [&'static str; 1] = ["audio-separator[gpu]"];
}

/// Downloader invocation.
pub struct DownloadConfig;

impl DownloadConfig {
    pub const OUTPUT_TEMPLATE: &'static str = "%(title)s.%(ext)s";
    pub const VIDEO_FORMAT: &'static str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";
    pub const AUDIO_FORMAT: &'static str = "wav";
    pub const STATUS_LINE_MAX_CHARS: usize = 80;
    /// Longest unterminated line kept; older bytes are dropped past this.
    pub const MAX_LINE_BYTES: usize = 4096;
}

/// Media transcode invocation.
pub struct ConvertConfig;

impl ConvertConfig {
    pub const AUDIO_CODEC: &'static str = "pcm_s16le";
    pub const SAMPLE_RATE: u32 = 44_100;
    pub const CHANNELS: u16 = 2;
    pub const ERROR_TAIL_CHARS: usize = 200;
}

/// Defaults for the persisted mode record.
pub struct ModeDefaults;

impl ModeDefaults {
    pub const MAX_RECENT: usize = 10;
    pub const MAX_RECENT_MIN: usize = 1;
    pub const MAX_RECENT_MAX: usize = 50;
}

/// Shared directory and file names.
pub struct PathsConfig;

impl PathsConfig {
    pub const MODELS_DIR_NAME: &'static str = "models";
    pub const LOGS_DIR_NAME: &'static str = "logs";
    pub const CONFIG_FILE_NAME: &'static str = "config.json";
    pub const OUTPUT_DIR_NAME: &'static str = "amv-script";
    pub const VIDEO_DIR_NAME: &'static str = "video downloads";
    pub const AUDIO_DIR_NAME: &'static str = "audio downloads";
    pub const SEPARATOR_LOG_NAME: &'static str = "separator-debug.log";
}

/// Resolved on-disk locations.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Data root holding models, logs and config.json.
    pub root: PathBuf,
    /// Directory the user launched from; downloads land under it.
    pub original_dir: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>, original_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            original_dir: original_dir.into(),
        }
    }

    /// Resolve paths from an explicit root, `AMV_HOME`, or the platform data dir.
    pub fn discover(explicit_root: Option<PathBuf>) -> Result<Self> {
        let root = match explicit_root {
            Some(root) => root,
            None => match std::env::var_os(AppConfig::HOME_ENV) {
                Some(home) => PathBuf::from(home),
                None => dirs::data_dir()
                    .map(|d| d.join(AppConfig::DATA_DIR_NAME))
                    .ok_or_else(|| AmvError::Config {
                        message: "Could not determine a data directory; pass --root".into(),
                    })?,
            },
        };

        let original_dir = match std::env::var_os(AppConfig::ORIGINAL_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir()?,
        };

        Ok(Self { root, original_dir })
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join(PathsConfig::MODELS_DIR_NAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(PathsConfig::LOGS_DIR_NAME)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(PathsConfig::CONFIG_FILE_NAME)
    }

    pub fn separator_log(&self) -> PathBuf {
        self.logs_dir().join(PathsConfig::SEPARATOR_LOG_NAME)
    }

    pub fn output_base(&self) -> PathBuf {
        self.original_dir.join(PathsConfig::OUTPUT_DIR_NAME)
    }

    pub fn video_dir(&self) -> PathBuf {
        self.output_base().join(PathsConfig::VIDEO_DIR_NAME)
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.output_base().join(PathsConfig::AUDIO_DIR_NAME)
    }

    /// Create every directory the toolkit writes into.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.models_dir(),
            self.logs_dir(),
            self.video_dir(),
            self.audio_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| AmvError::io("Failed to create", &dir, e))?;
        }
        Ok(())
    }
}

/// External programs the toolkit drives.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub python: PathBuf,
    pub nvidia_smi: PathBuf,
    pub yt_dlp: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub audio_separator: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        let python = std::env::var_os(AppConfig::PYTHON_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                PathBuf::from(if cfg!(windows) { "python" } else { "python3" })
            });
        Self {
            python,
            nvidia_smi: PathBuf::from("nvidia-smi"),
            yt_dlp: PathBuf::from("yt-dlp"),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            audio_separator: PathBuf::from("audio-separator"),
        }
    }
}

impl ToolPaths {
    /// Display name for a tool path, used in user-facing errors.
    pub fn tool_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string())
    }
}
