//! Duration, padding and truncation of audio files.
//!
//! WAV is handled in-process with hound and is always available. Other
//! formats go through ffprobe/ffmpeg and are available only when those
//! binaries respond. Padding always produces WAV.

use crate::config::{ConvertConfig, SetupConfig, ToolPaths};
use crate::error::{AmvError, Result};
use crate::platform::{command_responds, run_blocking_with_timeout, tail_chars};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Audio editing needed around a separation run.
pub trait AudioEditor: Send + Sync {
    /// Whether this editor can read `path`.
    fn is_available(&self, path: &Path) -> bool;

    fn duration(&self, path: &Path) -> Result<Duration>;

    /// Write `input` followed by silence to `output` (WAV) so the result
    /// lasts `total`.
    fn pad_with_silence(&self, input: &Path, output: &Path, total: Duration) -> Result<()>;

    /// Cut `path` in place to at most `length`.
    fn truncate(&self, path: &Path, length: Duration) -> Result<()>;
}

/// hound for WAV, ffmpeg for everything else.
#[derive(Debug)]
pub struct MediaEditor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    external_ok: OnceLock<bool>,
}

impl MediaEditor {
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
            external_ok: OnceLock::new(),
        }
    }

    fn external_available(&self) -> bool {
        *self.external_ok.get_or_init(|| {
            command_responds(&self.ffmpeg, SetupConfig::QUICK_TIMEOUT)
                && command_responds(&self.ffprobe, SetupConfig::QUICK_TIMEOUT)
        })
    }

    fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(args);
        let output = run_blocking_with_timeout(&mut cmd, SetupConfig::STEP_TIMEOUT)?;
        if output.success() {
            Ok(())
        } else {
            Err(AmvError::ToolFailed {
                tool: ToolPaths::tool_name(&self.ffmpeg),
                message: tail_chars(output.stderr.trim(), ConvertConfig::ERROR_TAIL_CHARS),
            })
        }
    }
}

impl AudioEditor for MediaEditor {
    fn is_available(&self, path: &Path) -> bool {
        is_wav(path) || self.external_available()
    }

    fn duration(&self, path: &Path) -> Result<Duration> {
        if is_wav(path) {
            return wav_duration(path);
        }

        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path);
        let output = run_blocking_with_timeout(&mut cmd, SetupConfig::PROBE_TIMEOUT)?;
        let secs = output
            .stdout
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|s| s.is_finite() && *s >= 0.0)
            .ok_or_else(|| AmvError::Audio {
                message: format!("Could not read duration of {}", path.display()),
            })?;
        Ok(Duration::from_secs_f64(secs))
    }

    fn pad_with_silence(&self, input: &Path, output: &Path, total: Duration) -> Result<()> {
        if is_wav(input) {
            return wav_pad(input, output, total);
        }
        self.run_ffmpeg(&[
            "-y".into(),
            "-i".into(),
            input.to_string_lossy().to_string(),
            "-af".into(),
            format!("apad=whole_dur={:.3}", total.as_secs_f64()),
            "-acodec".into(),
            ConvertConfig::AUDIO_CODEC.into(),
            output.to_string_lossy().to_string(),
        ])
    }

    fn truncate(&self, path: &Path, length: Duration) -> Result<()> {
        if is_wav(path) {
            return wav_truncate(path, length);
        }

        let dir = parent_dir(path);
        let suffix = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix(".amv-trim-")
            .suffix(&suffix)
            .tempfile_in(&dir)
            .map_err(|e| AmvError::io("Failed to create temp file in", &dir, e))?;

        self.run_ffmpeg(&[
            "-y".into(),
            "-i".into(),
            path.to_string_lossy().to_string(),
            "-t".into(),
            format!("{:.3}", length.as_secs_f64()),
            temp.path().to_string_lossy().to_string(),
        ])?;

        temp.persist(path).map_err(|e| AmvError::io("Failed to replace", path, e.error))?;
        Ok(())
    }
}

pub fn is_wav(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn frames_for(spec: &WavSpec, length: Duration) -> u32 {
    (length.as_secs_f64() * spec.sample_rate as f64).round() as u32
}

pub fn wav_duration(path: &Path) -> Result<Duration> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(AmvError::Audio {
            message: format!("{} has a zero sample rate", path.display()),
        });
    }
    Ok(Duration::from_secs_f64(reader.duration() as f64 / spec.sample_rate as f64))
}

fn wav_pad(input: &Path, output: &Path, total: Duration) -> Result<()> {
    let mut reader = WavReader::open(input)?;
    let spec = reader.spec();
    let have_frames = reader.duration();
    let want_frames = frames_for(&spec, total).max(have_frames);

    let mut writer = WavWriter::create(output, spec)?;
    copy_samples(&mut reader, &mut writer, None)?;
    let silence = (want_frames - have_frames) as usize * spec.channels as usize;
    write_silence(&mut writer, spec.sample_format, silence)?;
    writer.finalize()?;

    debug!(
        "Padded {} from {} to {} frames",
        input.display(),
        have_frames,
        want_frames
    );
    Ok(())
}

fn wav_truncate(path: &Path, length: Duration) -> Result<()> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let keep_frames = frames_for(&spec, length);
    if keep_frames >= reader.duration() {
        return Ok(());
    }

    let dir = parent_dir(path);
    let temp = tempfile::Builder::new()
        .prefix(".amv-trim-")
        .suffix(".wav")
        .tempfile_in(&dir)
        .map_err(|e| AmvError::io("Failed to create temp file in", &dir, e))?;

    {
        let file = temp.reopen()?;
        let mut writer = WavWriter::new(BufWriter::new(file), spec)?;
        let keep_samples = keep_frames as usize * spec.channels as usize;
        copy_samples(&mut reader, &mut writer, Some(keep_samples))?;
        writer.finalize()?;
    }
    drop(reader);

    temp.persist(path).map_err(|e| AmvError::io("Failed to replace", path, e.error))?;
    debug!("Truncated {} to {} frames", path.display(), keep_frames);
    Ok(())
}

fn copy_samples<R: Read, W: Write + Seek>(
    reader: &mut WavReader<R>,
    writer: &mut WavWriter<W>,
    limit: Option<usize>,
) -> Result<()> {
    let limit = limit.unwrap_or(usize::MAX);
    match reader.spec().sample_format {
        SampleFormat::Float => {
            for sample in reader.samples::<f32>().take(limit) {
                writer.write_sample(sample?)?;
            }
        }
        SampleFormat::Int => {
            for sample in reader.samples::<i32>().take(limit) {
                writer.write_sample(sample?)?;
            }
        }
    }
    Ok(())
}

fn write_silence<W: Write + Seek>(writer: &mut WavWriter<W>, format: SampleFormat, samples: usize) -> Result<()> {
    for _ in 0..samples {
        match format {
            SampleFormat::Float => writer.write_sample(0.0f32)?,
            SampleFormat::Int => writer.write_sample(0i32)?,
        }
    }
    Ok(())
}
