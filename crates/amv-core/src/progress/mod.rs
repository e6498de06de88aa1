//! Normalized progress events from unrelated external processes.
//!
//! Adapters are push-based: whoever owns the subprocess feeds them raw
//! chunks and forwards the returned events over a [`ProgressSender`]. The
//! UI-owning task is the only consumer. Unparseable input never errors; it
//! simply produces no event.

mod line_split;
mod marker_scan;

pub use line_split::LineSplitAdapter;
pub use marker_scan::MarkerScanAdapter;

use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

/// Which of the downloader's output streams a percentage belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStream {
    Video,
    Audio,
}

impl fmt::Display for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaStream::Video => write!(f, "video"),
            MediaStream::Audio => write!(f, "audio"),
        }
    }
}

/// Stage of a job as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum Stage {
    Queued,
    Loading,
    Downloading { stream: MediaStream },
    Processing,
    Finalizing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Queued => write!(f, "queued"),
            Stage::Loading => write!(f, "loading"),
            Stage::Downloading { stream } => write!(f, "downloading {}", stream),
            Stage::Processing => write!(f, "processing"),
            Stage::Finalizing => write!(f, "finalizing"),
        }
    }
}

/// One progress update. `percent` is in `[-1, 100]`; -1 means indeterminate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    #[serde(flatten)]
    pub stage: Stage,
    pub percent: i8,
    pub message: String,
}

impl ProgressEvent {
    pub const INDETERMINATE: i8 = -1;

    pub fn new(stage: Stage, percent: i32, message: impl Into<String>) -> Self {
        Self {
            stage,
            percent: percent.clamp(Self::INDETERMINATE as i32, 100) as i8,
            message: message.into(),
        }
    }

    pub fn indeterminate(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, Self::INDETERMINATE as i32, message)
    }

    pub fn is_indeterminate(&self) -> bool {
        self.percent < 0
    }
}

/// Converts a raw output stream into progress events.
pub trait ProgressAdapter: Send {
    /// Consume one captured chunk. Returns the newest event the chunk
    /// produced, if any.
    fn feed(&mut self, chunk: &[u8]) -> Option<ProgressEvent>;
}

/// Hand-off from background work to the UI-owning task. Sending never
/// blocks, so it is usable from `spawn_blocking` threads.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Send if there is a listener; a closed channel is not an error.
pub fn emit(sender: Option<&ProgressSender>, event: ProgressEvent) {
    if let Some(tx) = sender {
        let _ = tx.send(event);
    }
}
