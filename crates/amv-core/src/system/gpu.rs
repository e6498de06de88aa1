//! Vendor diagnostic tools that name a physically present accelerator.
//!
//! Works even when no accelerated runtime is installed yet, which is how a
//! fresh install learns it should offer GPU mode.

use crate::platform::run_blocking_with_timeout;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// Names an accelerator without needing a runtime.
pub trait VendorDiagnostic: Send + Sync {
    /// Name of the first accelerator, or `None` when nothing answers.
    fn device_name(&self) -> Option<String>;
}

/// NVIDIA accelerator detection via nvidia-smi.
#[derive(Debug, Clone)]
pub struct NvidiaSmi {
    program: PathBuf,
    timeout: Duration,
}

impl NvidiaSmi {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl VendorDiagnostic for NvidiaSmi {
    fn device_name(&self) -> Option<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--query-gpu=name", "--format=csv,noheader,nounits"]);

        match run_blocking_with_timeout(&mut cmd, self.timeout) {
            Ok(output) if output.success() => first_device(&output.stdout),
            Ok(output) => {
                debug!("nvidia-smi returned non-zero: {}", output.stderr.trim());
                None
            }
            Err(e) => {
                debug!("Failed to run nvidia-smi: {}", e);
                None
            }
        }
    }
}

fn first_device(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
