//! Hardware, mode and model overview.

use amv_core::models;
use amv_core::platform::current_platform;
use amv_core::{RuntimeStatus, Toolkit};
use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

pub async fn status(toolkit: Arc<Toolkit>) -> Result<()> {
    let probe = Arc::clone(toolkit.probe());
    let (capability, runtime) = tokio::task::spawn_blocking(move || (probe.probe(), probe.runtime_status())).await?;
    let loaded = toolkit.store().load();
    if loaded.recovered {
        warn!("{} was unreadable; showing defaults", toolkit.store().path().display());
    }
    let mode = loaded.record;
    let (model, settings) = models::select(&capability);

    println!("Platform:   {}", current_platform());
    println!("Device:     {} ({})", capability.device_name, capability.device_short());
    if let Some(vram) = capability.vram_display() {
        println!("VRAM:       {}", vram);
    }
    if let Some(tier) = capability.compute_tier {
        println!("Compute:    sm_{}", tier);
    }
    println!("Provider:   {}", capability.runtime_provider);
    println!(
        "Runtime:    {}",
        match runtime {
            RuntimeStatus::Accelerated => "accelerated",
            RuntimeStatus::CpuOnly => "cpu only",
            RuntimeStatus::NotInstalled => "not installed",
        }
    );
    println!("Mode:       {}{}", mode.setup_type, if mode.force_cpu { " (forced)" } else { "" });
    println!(
        "Model:      {} (fp16={}, batch={})",
        model.display_name, settings.fp16, settings.batch_size
    );

    let suggested = capability.suggested_mode();
    if suggested != mode.setup_type && !mode.force_cpu {
        println!("Hint:       this machine can run in {} mode (amv switch {})", suggested, suggested);
    }
    Ok(())
}
