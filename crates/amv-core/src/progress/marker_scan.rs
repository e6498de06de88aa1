//! Progress from an inference library's progress-bar diagnostics.
//!
//! Progress bars print `NN%|████...` to the diagnostic stream. Every write is
//! forwarded verbatim to the real sink first; scanning for the marker is a
//! side channel. Only the few trailing characters that could begin a marker
//! are carried between writes.

use crate::progress::{ProgressAdapter, ProgressEvent, Stage};
use regex::Regex;
use std::io::Write;
use std::sync::LazyLock;
use tracing::debug;

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})%\|").expect("marker regex must compile"));

/// Longest marker is `100%|`; keeping one char less is enough to join a
/// marker split across two writes.
const CARRY_CHARS: usize = 4;

/// Tees a diagnostic stream into a sink while extracting percentages.
pub struct MarkerScanAdapter<W: Write> {
    sink: W,
    carry: String,
    last_percent: Option<i32>,
}

impl<W: Write> MarkerScanAdapter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            carry: String::new(),
            last_percent: None,
        }
    }

    /// Give back the sink, flushed.
    pub fn into_inner(mut self) -> W {
        let _ = self.sink.flush();
        self.sink
    }

    fn scan(&mut self, chunk: &[u8]) -> Option<i32> {
        let text = format!("{}{}", self.carry, String::from_utf8_lossy(chunk));

        let found = MARKER_RE.captures_iter(&text).last().map(|caps| {
            let end = caps.get(0).map(|m| m.end()).unwrap_or(0);
            (caps[1].parse::<i32>().ok(), end)
        });

        let rest = match found {
            Some((_, end)) => &text[end..],
            None => text.as_str(),
        };
        let skip = rest.chars().count().saturating_sub(CARRY_CHARS);
        self.carry = rest.chars().skip(skip).collect();

        found.and_then(|(pct, _)| pct).filter(|p| *p <= 100)
    }
}

impl<W: Write + Send> ProgressAdapter for MarkerScanAdapter<W> {
    fn feed(&mut self, chunk: &[u8]) -> Option<ProgressEvent> {
        if let Err(e) = self.sink.write_all(chunk) {
            debug!("Diagnostic sink write failed: {}", e);
        }

        let pct = self.scan(chunk)?;
        if self.last_percent == Some(pct) {
            return None;
        }
        self.last_percent = Some(pct);
        Some(ProgressEvent::new(
            Stage::Processing,
            pct,
            format!("{}% complete", pct),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwards_everything_and_emits_on_change() {
        let mut adapter = MarkerScanAdapter::new(Vec::new());
        let writes: [&[u8]; 4] = [
            b" 30%|\xe2\x96\x88\xe2\x96\x88   | 3/10 [00:08<00:19]\r",
            b" 30%|\xe2\x96\x88\xe2\x96\x88   | 3/10 [00:09<00:19]\r",
            b"some log line\n",
            b" 40%|\xe2\x96\x88\xe2\x96\x88\xe2\x96\x88  | 4/10\r",
        ];
        let events: Vec<_> = writes.iter().filter_map(|w| adapter.feed(w)).collect();

        assert_eq!(events.iter().map(|e| e.percent).collect::<Vec<_>>(), vec![30, 40]);
        assert!(events.iter().all(|e| e.stage == Stage::Processing));

        let forwarded = adapter.into_inner();
        assert_eq!(forwarded, writes.concat());
    }

    #[test]
    fn test_marker_split_across_writes() {
        let mut adapter = MarkerScanAdapter::new(std::io::sink());
        assert!(adapter.feed(b"Processing:  1").is_none());
        let event = adapter.feed(b"00%|##########| 10/10").unwrap();
        assert_eq!(event.percent, 100);
    }

    #[test]
    fn test_completed_marker_is_not_rematched_from_carry() {
        let mut adapter = MarkerScanAdapter::new(std::io::sink());
        assert_eq!(adapter.feed(b" 45%|").map(|e| e.percent), Some(45));
        // The carry must not turn the old "45%|" into a fresh "5%|".
        assert!(adapter.feed(b" elapsed").is_none());
        assert!(adapter.feed(b"\n").is_none());
    }

    #[test]
    fn test_plain_percentages_are_ignored() {
        let mut adapter = MarkerScanAdapter::new(std::io::sink());
        assert!(adapter.feed(b"loaded 50% of weights\n").is_none());
        assert!(adapter.feed(b"999%|").is_none());
    }
}
