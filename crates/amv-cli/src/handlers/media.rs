//! Downloads, conversion, scanning and the recent-file list.

use super::{print_progress, pump};
use amv_core::media::{scan_media, ConvertJob, DownloadJob, DownloadMode, MediaKinds};
use amv_core::progress::progress_channel;
use amv_core::Toolkit;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

pub async fn download(toolkit: Arc<Toolkit>, url: &str, video: bool) -> Result<()> {
    let (mode, dir) = if video {
        (DownloadMode::Video, toolkit.paths().video_dir())
    } else {
        (DownloadMode::Audio, toolkit.paths().audio_dir())
    };

    let (tx, rx) = progress_channel();
    let job = DownloadJob::new(url, mode, dir, toolkit.tools())?
        .with_audit(toolkit.audit().clone())
        .with_progress(tx);
    let task = tokio::spawn(async move { job.run().await });
    pump(rx, None, print_progress).await;
    let outcome = task.await??;

    println!("Downloaded: {}", outcome.title);
    println!("Saved to:   {}", outcome.output_dir.display());
    Ok(())
}

pub async fn convert(toolkit: Arc<Toolkit>, file: PathBuf) -> Result<()> {
    let input = std::path::absolute(&file)?;
    let job = ConvertJob::new(&input, toolkit.tools()).with_audit(toolkit.audit().clone());
    println!("Converting {}...", input.display());
    let output = job.run().await?;

    if let Err(e) = toolkit.store().add_recent_file(&input) {
        warn!("Could not update recent files: {}", e);
    }
    println!("Saved {}", output.display());
    Ok(())
}

pub async fn scan(toolkit: Arc<Toolkit>, dir: Option<PathBuf>, media: bool) -> Result<()> {
    let dir = dir.unwrap_or_else(|| toolkit.paths().original_dir.clone());
    let kinds = if media {
        MediaKinds::Convertible
    } else {
        MediaKinds::Audio
    };
    let exclude = toolkit.mode().recent_files;

    let found = tokio::task::spawn_blocking(move || scan_media(&dir, kinds, &exclude)).await?;
    if found.is_empty() {
        println!("No matching files found.");
    }
    for path in found {
        println!("{}", path.display());
    }
    Ok(())
}

pub fn recent(toolkit: Arc<Toolkit>) -> Result<()> {
    let mode = toolkit.mode();
    if mode.recent_files.is_empty() {
        println!("No recent files.");
    }
    for (i, path) in mode.recent_files.iter().enumerate() {
        println!("{:>2}. {}", i + 1, path);
    }
    Ok(())
}
