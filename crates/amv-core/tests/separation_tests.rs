//! Integration tests for SeparationJob with a scripted backend.
//!
//! The backend copies its input into `(Vocals)` / `(Instrumental)` files the
//! way the separation library names them, so padding, trimming, backup and
//! renaming all run against real WAV files.

use amv_core::progress::progress_channel;
use amv_core::separation::{
    wav_duration, ArtifactRole, JobPhase, MediaEditor, SeparationBackend, SeparationJob, SeparationRequest,
};
use amv_core::config::SeparationConfig;
use amv_core::{AmvError, CancellationToken, CapabilityDescriptor, Stage, ToolPaths};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn write_tone(path: &Path, secs: u32) {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for i in 0..(secs * 8000) {
        writer.write_sample(((i % 100) as i16) * 50).unwrap();
    }
    writer.finalize().unwrap();
}

#[derive(Default)]
struct ScriptedBackend {
    fail: bool,
    released: AtomicBool,
    calls: AtomicUsize,
    inputs: Mutex<Vec<PathBuf>>,
}

impl SeparationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn separate(&self, request: &SeparationRequest, diagnostics: &mut dyn FnMut(&[u8])) -> amv_core::Result<Vec<PathBuf>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(request.input.clone());
        diagnostics(b"Separating:  25%|##   | 1/4\r");
        diagnostics(b"Separating:  50%|####");

        if self.fail {
            return Err(AmvError::JobFailed {
                message: "CUDA out of memory".into(),
            });
        }

        let stem = request.input.file_stem().unwrap().to_string_lossy().to_string();
        let mut outputs = Vec::new();
        for tag in ["(Vocals)", "(Instrumental)"] {
            let out = request
                .output_dir
                .join(format!("{}_{}_{}.wav", stem, tag, request.model.id.replace(".onnx", "")));
            std::fs::copy(&request.input, &out).unwrap();
            outputs.push(out);
        }
        Ok(outputs)
    }

    fn release_resources(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

fn job(input: &Path, backend: Arc<ScriptedBackend>) -> SeparationJob {
    SeparationJob::new(
        input,
        Arc::new(CapabilityDescriptor::cpu(true)),
        backend,
        Arc::new(MediaEditor::new(&ToolPaths::default())),
    )
}

fn names_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn test_short_input_is_padded_trimmed_and_backed_up() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("song.wav");
    write_tone(&input, 3);

    let backend = Arc::new(ScriptedBackend::default());
    let mut job = job(&input, backend.clone());
    let outcome = job.run().unwrap();

    // The backend saw a padded temp copy beside the original, now removed.
    let seen = backend.inputs.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    let padded_name = seen[0].file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(seen[0].parent(), Some(temp.path()));
    assert!(padded_name.starts_with("temp_song.") && padded_name.ends_with(".wav"));
    assert!(!seen[0].exists());
    assert!(outcome.padded);

    assert_eq!(
        names_in(temp.path()),
        vec!["song (original).wav", "song [instrumental].wav", "song [vocals].wav"]
    );
    assert_eq!(outcome.backup, Some(temp.path().join("song (original).wav")));

    for artifact in &outcome.artifacts {
        let secs = wav_duration(&artifact.path).unwrap().as_secs_f64();
        assert!(secs <= 3.001, "{} is {secs}s", artifact.path.display());
    }
    let roles: Vec<_> = outcome.artifacts.iter().map(|a| a.role).collect();
    assert!(roles.contains(&ArtifactRole::Vocals));
    assert!(roles.contains(&ArtifactRole::Instrumental));

    assert!(backend.released.load(Ordering::SeqCst));
    assert_eq!(
        job.phases(),
        &[
            JobPhase::Pending,
            JobPhase::Padding,
            JobPhase::Loading,
            JobPhase::Processing,
            JobPhase::Finalizing,
            JobPhase::Succeeded,
        ]
    );
}

#[test]
fn test_rerun_on_backup_collides_to_numbered_names() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("song.wav");
    write_tone(&input, 12);

    let backend = Arc::new(ScriptedBackend::default());
    let first = job(&input, backend.clone()).run().unwrap();
    assert!(!first.padded);

    let backup = temp.path().join("song (original).wav");
    let second = job(&backup, backend.clone()).run().unwrap();
    assert_eq!(second.backup, None);

    assert_eq!(
        names_in(temp.path()),
        vec![
            "song (original).wav",
            "song [instrumental] (1).wav",
            "song [instrumental].wav",
            "song [vocals] (1).wav",
            "song [vocals].wav",
        ]
    );
    // Long inputs go straight to the backend.
    assert_eq!(backend.inputs.lock().unwrap()[0], input);
}

#[test]
fn test_padding_never_touches_existing_temp_named_file() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("song.wav");
    write_tone(&input, 3);
    let user_file = temp.path().join("temp_song.wav");
    std::fs::write(&user_file, b"not ours").unwrap();

    let backend = Arc::new(ScriptedBackend::default());
    let outcome = job(&input, backend.clone()).run().unwrap();

    assert!(outcome.padded);
    assert_ne!(backend.inputs.lock().unwrap()[0], user_file);
    assert_eq!(std::fs::read(&user_file).unwrap(), b"not ours");
    assert_eq!(
        names_in(temp.path()),
        vec![
            "song (original).wav",
            "song [instrumental].wav",
            "song [vocals].wav",
            "temp_song.wav"
        ]
    );
}

#[test]
fn test_exhausted_names_leave_input_and_existing_outputs_in_place() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("song.wav");
    write_tone(&input, 12);

    let mut taken = vec!["song [instrumental].wav".to_string()];
    taken.extend((1..=SeparationConfig::MAX_NAME_ATTEMPTS).map(|n| format!("song [instrumental] ({}).wav", n)));
    for name in &taken {
        std::fs::write(temp.path().join(name), b"x").unwrap();
    }

    let backend = Arc::new(ScriptedBackend::default());
    let mut job = job(&input, backend.clone());
    let err = job.run().unwrap_err();

    assert!(matches!(err, AmvError::NameExhausted { .. }), "{err}");
    assert_eq!(job.phase(), JobPhase::Failed);
    assert!(input.exists(), "input must not be backed up");
    assert!(!temp.path().join("song (original).wav").exists());
    assert!(!temp.path().join("song [vocals].wav").exists());

    // Only the pre-existing files and the input remain; library outputs are gone.
    let mut expected = taken.clone();
    expected.push("song.wav".to_string());
    expected.sort();
    assert_eq!(names_in(temp.path()), expected);
}

#[test]
fn test_failure_still_cleans_up() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("clip.wav");
    write_tone(&input, 2);

    let backend = Arc::new(ScriptedBackend {
        fail: true,
        ..ScriptedBackend::default()
    });
    let mut job = job(&input, backend.clone());
    let err = job.run().unwrap_err();

    assert!(err.to_string().contains("CUDA out of memory"));
    assert_eq!(job.phase(), JobPhase::Failed);
    assert!(backend.released.load(Ordering::SeqCst));
    // Temp copy removed, original untouched and not backed up.
    assert_eq!(names_in(temp.path()), vec!["clip.wav"]);
}

#[test]
fn test_cancelled_before_start_touches_nothing() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("clip.wav");
    write_tone(&input, 2);

    let token = CancellationToken::new();
    token.cancel();
    let backend = Arc::new(ScriptedBackend::default());
    let err = job(&input, backend.clone())
        .with_cancellation(token)
        .run()
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert!(backend.released.load(Ordering::SeqCst));
    assert_eq!(names_in(temp.path()), vec!["clip.wav"]);
}

#[test]
fn test_missing_input_fails_fast() {
    let temp = TempDir::new().unwrap();
    let backend = Arc::new(ScriptedBackend::default());
    let err = job(&temp.path().join("nope.wav"), backend.clone()).run().unwrap_err();
    assert!(matches!(err, AmvError::FileNotFound(_)));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_progress_follows_library_markers() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("song.wav");
    write_tone(&input, 12);
    let log = temp.path().join("logs").join("separator-debug.log");

    let (tx, mut rx) = progress_channel();
    let backend = Arc::new(ScriptedBackend::default());
    job(&input, backend)
        .with_progress(tx)
        .with_diagnostics_log(&log)
        .run()
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let processing: Vec<i8> = events
        .iter()
        .filter(|e| e.stage == Stage::Processing)
        .map(|e| e.percent)
        .collect();
    assert_eq!(processing, vec![0, 25, 50]);
    assert!(events.iter().any(|e| e.stage == Stage::Loading && e.is_indeterminate()));
    let last = events.last().unwrap();
    assert_eq!((last.stage, last.percent), (Stage::Finalizing, 100));

    let raw = std::fs::read_to_string(&log).unwrap();
    assert!(raw.contains("50%|####"));
}
