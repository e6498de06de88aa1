//! Output naming for separation artifacts.
//!
//! Final names are `{clean stem} {role marker}.{ext}` next to the input.
//! Existing files are never overwritten: a collision gets ` (1)`, ` (2)`, ...
//! up to a fixed number of attempts.

use crate::config::SeparationConfig;
use crate::error::{AmvError, Result};
use serde::Serialize;
use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

/// What a produced artifact contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactRole {
    Vocals,
    Instrumental,
}

impl ArtifactRole {
    pub fn marker(&self) -> &'static str {
        match self {
            ArtifactRole::Vocals => SeparationConfig::VOCALS_MARKER,
            ArtifactRole::Instrumental => SeparationConfig::INSTRUMENTAL_MARKER,
        }
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactRole::Vocals => write!(f, "vocals"),
            ArtifactRole::Instrumental => write!(f, "instrumental"),
        }
    }
}

/// Classify an artifact by the library's own file name.
///
/// The library tags stems as `(Vocals)` / `(Instrumental)`. Those tags are
/// checked first because model names (e.g. `Kim_Vocal_2`) are also embedded
/// in every output name; otherwise any `vocal` substring means vocals.
pub fn classify_role(file_name: &str) -> ArtifactRole {
    let lower = file_name.to_lowercase();
    if lower.contains("(instrumental)") {
        ArtifactRole::Instrumental
    } else if lower.contains("(vocals)") || lower.contains("vocal") {
        ArtifactRole::Vocals
    } else {
        ArtifactRole::Instrumental
    }
}

/// Stem with any backup marker removed, so re-running on a backed-up file
/// produces the same output names.
pub fn clean_stem(stem: &str) -> String {
    let marker = SeparationConfig::BACKUP_MARKER.trim();
    stem.replace(SeparationConfig::BACKUP_MARKER, "")
        .replace(marker, "")
        .trim()
        .to_string()
}

/// True when the stem already carries the backup marker.
pub fn is_backup_stem(stem: &str) -> bool {
    stem.contains(SeparationConfig::BACKUP_MARKER.trim())
}

/// `{stem} {marker}.{ext}` where the extension comes from the library's file
/// name, defaulting to wav.
pub fn build_output_name(stem: &str, marker: &str, library_file_name: &str) -> String {
    let ext = Path::new(library_file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| SeparationConfig::DEFAULT_EXTENSION.to_string());
    format!("{} {}.{}", stem, marker, ext)
}

/// Backup location for an input: `{stem} (original){ext}` beside it.
pub fn backup_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, SeparationConfig::BACKUP_MARKER, ext.to_string_lossy()),
        None => format!("{}{}", stem, SeparationConfig::BACKUP_MARKER),
    };
    input.with_file_name(name)
}

/// First free path among `p`, `p (1)`, `p (2)`, ...
pub fn unique_path(path: &Path) -> Result<PathBuf> {
    unique_path_with(path, |p| p.exists())
}

/// [`unique_path`] with an injectable existence check.
pub fn unique_path_with(path: &Path, exists: impl Fn(&Path) -> bool) -> Result<PathBuf> {
    candidates(path)
        .find(|candidate| !exists(candidate))
        .ok_or_else(|| exhausted(path))
}

/// Like [`unique_path`], but takes the name by creating an empty file with
/// `create_new`. The caller owns the placeholder and renames over it, so a
/// file that appears after the check can never be replaced.
pub fn claim_unique_path(path: &Path) -> Result<PathBuf> {
    for candidate in candidates(path) {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(AmvError::io("Failed to reserve", &candidate, e)),
        }
    }
    Err(exhausted(path))
}

fn candidates(path: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());

    std::iter::once(path.to_path_buf()).chain((1..=SeparationConfig::MAX_NAME_ATTEMPTS).map(move |n| {
        let name = match &ext {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        path.with_file_name(name)
    }))
}

fn exhausted(path: &Path) -> AmvError {
    AmvError::NameExhausted {
        path: path.to_path_buf(),
        attempts: SeparationConfig::MAX_NAME_ATTEMPTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_build_output_name_uses_generated_extension() {
        assert_eq!(build_output_name("track", "[vocals]", "track_vocals.wav"), "track [vocals].wav");
        assert_eq!(
            build_output_name("track", "[instrumental]", "track_inst.flac"),
            "track [instrumental].flac"
        );
        assert_eq!(build_output_name("track", "[vocals]", "track_vocals"), "track [vocals].wav");
    }

    #[test]
    fn test_unique_path_returns_original_when_free() {
        let target = Path::new("/media/song [vocals].wav");
        assert_eq!(unique_path_with(target, |_| false).unwrap(), target);
    }

    #[test]
    fn test_unique_path_picks_lowest_free_suffix() {
        let taken: HashSet<PathBuf> = [
            "/media/song [vocals].wav",
            "/media/song [vocals] (1).wav",
            "/media/song [vocals] (3).wav",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        let result = unique_path_with(Path::new("/media/song [vocals].wav"), |p| taken.contains(p)).unwrap();
        assert_eq!(result, PathBuf::from("/media/song [vocals] (2).wav"));
    }

    #[test]
    fn test_unique_path_is_bounded() {
        let err = unique_path_with(Path::new("/media/x.wav"), |_| true).unwrap_err();
        assert!(matches!(err, AmvError::NameExhausted { attempts, .. } if attempts == SeparationConfig::MAX_NAME_ATTEMPTS));
    }

    #[test]
    fn test_unique_path_on_disk() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("a [vocals].wav");
        assert_eq!(unique_path(&target).unwrap(), target);
        std::fs::write(&target, b"x").unwrap();
        let next = unique_path(&target).unwrap();
        assert_eq!(next, temp.path().join("a [vocals] (1).wav"));
        assert!(!next.exists());
    }

    #[test]
    fn test_claim_reserves_and_never_reuses_a_name() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("a [vocals].wav");
        std::fs::write(&target, b"mine").unwrap();

        let first = claim_unique_path(&target).unwrap();
        let second = claim_unique_path(&target).unwrap();
        assert_eq!(first, temp.path().join("a [vocals] (1).wav"));
        assert_eq!(second, temp.path().join("a [vocals] (2).wav"));
        assert!(first.exists() && second.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"mine");
    }

    #[test]
    fn test_clean_stem_and_backup() {
        assert_eq!(clean_stem("song (original)"), "song");
        assert_eq!(clean_stem("song"), "song");
        assert!(is_backup_stem("song (original)"));
        assert!(!is_backup_stem("song"));
        assert_eq!(
            backup_path(Path::new("/m/song.mp3")),
            PathBuf::from("/m/song (original).mp3")
        );
    }

    #[test]
    fn test_classify_role() {
        assert_eq!(classify_role("song_(Vocals)_UVR-MDX.wav"), ArtifactRole::Vocals);
        assert_eq!(classify_role("song_(Instrumental)_Kim_Vocal_2.wav"), ArtifactRole::Instrumental);
        assert_eq!(classify_role("song_(Vocals)_Kim_Vocal_2.wav"), ArtifactRole::Vocals);
        assert_eq!(classify_role("track_vocals.wav"), ArtifactRole::Vocals);
        assert_eq!(classify_role("track_other.wav"), ArtifactRole::Instrumental);
    }
}
