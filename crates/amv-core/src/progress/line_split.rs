//! Progress from the downloader's merged stdout/stderr.
//!
//! The downloader rewrites its progress line in place with bare carriage
//! returns, so lines are recovered by splitting on both `\n` and `\r`. A
//! video download fetches two streams one after the other; each announces a
//! new destination file first, which is how percentages are attributed.

use crate::config::DownloadConfig;
use crate::progress::{MediaStream, ProgressAdapter, ProgressEvent, Stage};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

const DESTINATION_MARKER: &str = "[download] Destination:";

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[download\]\s+(\d+\.?\d*)%").expect("percent regex must compile"));

/// Per-format suffix the downloader adds before merging, e.g. `.f137`.
static FORMAT_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.f\d+$").expect("format suffix regex must compile"));

/// Splits a byte stream into lines and maps download lines to events.
#[derive(Debug)]
pub struct LineSplitAdapter {
    expects_video: bool,
    buffer: Vec<u8>,
    destinations: usize,
    title: Option<String>,
    last_video: Option<i32>,
    last_audio: Option<i32>,
    lines: Vec<String>,
}

impl LineSplitAdapter {
    /// Adapter for a download that fetches video and then audio.
    pub fn for_video() -> Self {
        Self::new(true)
    }

    /// Adapter for an audio-only download.
    pub fn for_audio() -> Self {
        Self::new(false)
    }

    fn new(expects_video: bool) -> Self {
        Self {
            expects_video,
            buffer: Vec::new(),
            destinations: 0,
            title: None,
            last_video: None,
            last_audio: None,
            lines: Vec::new(),
        }
    }

    /// Title taken from the first destination announcement.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Number of destination announcements seen so far.
    pub fn destinations(&self) -> usize {
        self.destinations
    }

    /// Streams the download has touched, for final 100% events.
    pub fn streams(&self) -> Vec<MediaStream> {
        if self.expects_video {
            vec![MediaStream::Video, MediaStream::Audio]
        } else {
            vec![MediaStream::Audio]
        }
    }

    /// Completed lines since the last call, in order.
    pub fn drain_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }

    /// Flush a trailing line that was not terminated before EOF.
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        self.end_line()
    }

    fn end_line(&mut self) -> Option<ProgressEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        if line.is_empty() {
            return None;
        }
        let event = self.parse_line(&line);
        self.lines.push(line);
        event
    }

    fn parse_line(&mut self, line: &str) -> Option<ProgressEvent> {
        if line.contains(DESTINATION_MARKER) {
            self.destinations += 1;
            if self.title.is_none() {
                self.title = title_from_destination(line);
            }
            debug!("Destination #{}: {}", self.destinations, line);
        }

        if let Some(caps) = PERCENT_RE.captures(line) {
            let pct = caps[1].parse::<f64>().ok()?.floor() as i32;
            let stream = if self.expects_video && self.destinations <= 1 {
                MediaStream::Video
            } else {
                MediaStream::Audio
            };
            let last = match stream {
                MediaStream::Video => &mut self.last_video,
                MediaStream::Audio => &mut self.last_audio,
            };
            if *last == Some(pct) {
                return None;
            }
            *last = Some(pct);
            return Some(ProgressEvent::new(
                Stage::Downloading { stream },
                pct,
                format!("Downloading {}: {}%", stream, pct),
            ));
        }

        if line.contains("[Merger]") || line.contains("[ExtractAudio]") {
            let status: String = line.chars().take(DownloadConfig::STATUS_LINE_MAX_CHARS).collect();
            return Some(ProgressEvent::indeterminate(Stage::Finalizing, status));
        }

        None
    }
}

impl ProgressAdapter for LineSplitAdapter {
    fn feed(&mut self, chunk: &[u8]) -> Option<ProgressEvent> {
        let mut newest = None;
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if let Some(event) = self.end_line() {
                    newest = Some(event);
                }
            } else {
                self.buffer.push(byte);
                if self.buffer.len() > DownloadConfig::MAX_LINE_BYTES {
                    // Progress lives at the end of a line; keep the tail.
                    let excess = self.buffer.len() - DownloadConfig::MAX_LINE_BYTES / 2;
                    self.buffer.drain(..excess);
                }
            }
        }
        newest
    }
}

fn title_from_destination(line: &str) -> Option<String> {
    let (_, dest) = line.split_once("Destination:")?;
    let dest = dest.trim();
    // Paths may come from another platform than ours; split on both separators.
    let file_name = dest.rsplit(['/', '\\']).next().unwrap_or(dest);
    let stem = Path::new(file_name).file_stem()?.to_string_lossy().to_string();
    let title = FORMAT_SUFFIX_RE.replace(&stem, "").to_string();
    (!title.is_empty()).then_some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(adapter: &mut LineSplitAdapter, bytes: &[u8]) -> Vec<ProgressEvent> {
        bytes
            .iter()
            .filter_map(|b| adapter.feed(std::slice::from_ref(b)))
            .collect()
    }

    #[test]
    fn test_two_destinations_route_to_two_streams() {
        let mut adapter = LineSplitAdapter::for_video();
        let input = b"[download] Destination: /out/My Clip.f137.mp4\n\
[download]  45.0% of 10.00MiB at 1.00MiB/s ETA 00:05\r\
[download]  45.3% of 10.00MiB at 1.00MiB/s ETA 00:05\r\
[download]  90.0% of 10.00MiB\n\
[download] Destination: /out/My Clip.f140.m4a\n\
[download]  45.0% of 2.00MiB\r\
[download] 100% of 2.00MiB\n";
        let events = feed_all(&mut adapter, input);

        let stages: Vec<_> = events.iter().map(|e| (e.stage, e.percent)).collect();
        let video = Stage::Downloading {
            stream: MediaStream::Video,
        };
        let audio = Stage::Downloading {
            stream: MediaStream::Audio,
        };
        assert_eq!(
            stages,
            vec![(video, 45), (video, 90), (audio, 45), (audio, 100)]
        );
        assert_eq!(adapter.title(), Some("My Clip"));
        assert_eq!(adapter.destinations(), 2);
    }

    #[test]
    fn test_audio_mode_routes_everything_to_audio() {
        let mut adapter = LineSplitAdapter::for_audio();
        let events = feed_all(
            &mut adapter,
            b"[download] Destination: C:\\dl\\Song.webm\r\n[download]  12.5% of 3MiB\r\n",
        );
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].stage,
            Stage::Downloading {
                stream: MediaStream::Audio
            }
        );
        assert_eq!(events[0].percent, 12);
        assert_eq!(adapter.title(), Some("Song"));
    }

    #[test]
    fn test_postprocess_lines_are_truncated_status() {
        let mut adapter = LineSplitAdapter::for_audio();
        let long_name = "x".repeat(200);
        let line = format!("[ExtractAudio] Destination: {}.wav\n", long_name);
        let events = feed_all(&mut adapter, line.as_bytes());
        let last = events.last().unwrap();
        assert_eq!(last.stage, Stage::Finalizing);
        assert!(last.is_indeterminate());
        assert_eq!(last.message.chars().count(), DownloadConfig::STATUS_LINE_MAX_CHARS);
    }

    #[test]
    fn test_unterminated_stream_stays_bounded() {
        let mut adapter = LineSplitAdapter::for_audio();
        let noise = vec![b'x'; DownloadConfig::MAX_LINE_BYTES * 3];
        assert!(adapter.feed(&noise).is_none());
        assert!(adapter.buffer.len() <= DownloadConfig::MAX_LINE_BYTES);

        // A percentage arriving after the noise still parses.
        let event = adapter.feed(b" [download]  12.0% of 3MiB\n").unwrap();
        assert_eq!(event.percent, 12);
    }

    #[test]
    fn test_noise_and_partial_lines() {
        let mut adapter = LineSplitAdapter::for_audio();
        assert!(adapter.feed(b"[youtube] abc: Downloading webpage\n\n\r").is_none());
        assert!(adapter.feed(b"[download]  50.0%").is_none());
        let event = adapter.finish().unwrap();
        assert_eq!(event.percent, 50);
        let lines = adapter.drain_lines();
        assert_eq!(lines.len(), 2);
        assert!(adapter.drain_lines().is_empty());
    }
}
