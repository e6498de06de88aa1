//! Recursive discovery of files to separate or convert.

use crate::config::SeparationConfig;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Which files a scan is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKinds {
    /// Inputs for separation.
    Audio,
    /// Inputs for conversion to WAV.
    Convertible,
}

impl MediaKinds {
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            MediaKinds::Audio => &["wav", "mp3", "flac", "m4a"],
            MediaKinds::Convertible => &["mp4", "mkv", "avi", "webm", "mov", "mp3", "flac", "m4a", "ogg", "aac"],
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|e| self.extensions().contains(&e.as_str()))
    }
}

/// Names of outputs this toolkit already produced.
pub fn is_processed_output(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    [
        SeparationConfig::VOCALS_MARKER,
        SeparationConfig::INSTRUMENTAL_MARKER,
        "[music]",
    ]
    .iter()
    .any(|m| name.contains(m))
}

/// Walk `dir` for files of `kinds`, skipping processed outputs and paths in
/// `exclude`. Results are absolute, unique, and sorted by file name.
pub fn scan_media(dir: &Path, kinds: MediaKinds, exclude: &[String]) -> Vec<PathBuf> {
    let root = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
    let mut seen: HashSet<PathBuf> = exclude.iter().map(PathBuf::from).collect();
    let mut found = Vec::new();

    for entry in WalkDir::new(&root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !kinds.matches(path) || is_processed_output(path) {
            continue;
        }
        if seen.insert(path.to_path_buf()) {
            found.push(path.to_path_buf());
        }
    }

    found.sort_by(|a, b| {
        a.file_name()
            .cmp(&b.file_name())
            .then_with(|| a.cmp(b))
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_scan_audio_skips_outputs_and_recents() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(&root.join("b.wav"));
        touch(&root.join("sub/a.MP3"));
        touch(&root.join("sub/a [vocals].wav"));
        touch(&root.join("sub/a [Instrumental].wav"));
        touch(&root.join("c.mp4"));
        touch(&root.join("recent.flac"));

        let root_abs = std::path::absolute(root).unwrap();
        let exclude = vec![root_abs.join("recent.flac").to_string_lossy().to_string()];
        let found = scan_media(root, MediaKinds::Audio, &exclude);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.MP3", "b.wav"]);
        assert!(found.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn test_scan_convertible() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("clip.mkv"));
        touch(&temp.path().join("song.wav"));
        touch(&temp.path().join("tune.ogg"));
        let found = scan_media(temp.path(), MediaKinds::Convertible, &[]);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| !p.to_string_lossy().ends_with(".wav")));
    }
}
