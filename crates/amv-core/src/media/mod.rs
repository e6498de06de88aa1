//! Media jobs outside the separation path.
//!
//! - `download` - yt-dlp downloads with line-split progress
//! - `convert` - ffmpeg transcode to WAV
//! - `scan` - finding candidate input files

mod convert;
mod download;
mod scan;

pub use convert::ConvertJob;
pub use download::{normalize_url, DownloadJob, DownloadMode, DownloadOutcome};
pub use scan::{is_processed_output, scan_media, MediaKinds};
