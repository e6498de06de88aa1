use super::{print_progress, pump};
use amv_core::progress::progress_channel;
use amv_core::separation::SeparationOutcome;
use amv_core::{CancellationToken, Toolkit};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

pub async fn separate(toolkit: Arc<Toolkit>, file: PathBuf) -> Result<()> {
    let input = std::path::absolute(&file)?;

    let token = CancellationToken::new();
    let (tx, rx) = progress_channel();
    let job_token = token.clone();
    let job_toolkit = Arc::clone(&toolkit);
    let job_input = input.clone();

    // Probing and inference both block; the job owns this thread until cleanup is done.
    let task = tokio::task::spawn_blocking(move || {
        job_toolkit
            .separation_job(&job_input)
            .with_progress(tx)
            .with_cancellation(job_token)
            .run()
    });
    pump(rx, Some(&token), print_progress).await;
    let outcome = task.await??;

    remember_source(&toolkit, &input, &outcome);

    println!("Model: {}", outcome.model.display_name);
    for artifact in &outcome.artifacts {
        println!("{:<13} {}", artifact.role.to_string(), artifact.path.display());
    }
    if let Some(backup) = &outcome.backup {
        println!("Original moved to {}", backup.display());
    }
    Ok(())
}

/// Add the source to the recent list under the name it has after the run.
fn remember_source(toolkit: &Toolkit, input: &Path, outcome: &SeparationOutcome) {
    let source = outcome.backup.as_deref().unwrap_or(input);
    if let Err(e) = toolkit.store().add_recent_file(source) {
        warn!("Could not update recent files: {}", e);
    }
}
