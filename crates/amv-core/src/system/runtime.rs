//! Accelerated tensor runtime introspection.
//!
//! The runtime lives in a Python environment, so the probe runs the
//! interpreter with a short inline script that prints one JSON object.
//! Any failure (no interpreter, timeout, garbage output) yields an empty
//! report; callers treat that as "nothing installed".

use crate::platform::run_blocking_with_timeout;
use crate::system::capability::ComputeTier;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// Accelerator reported by an initialized runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceleratorInfo {
    pub name: String,
    pub vram_bytes: Option<u64>,
    pub compute_tier: Option<ComputeTier>,
    pub device_count: u32,
}

/// What the runtime environment has installed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeReport {
    pub torch_version: Option<String>,
    pub onnxruntime: bool,
    pub accelerator: Option<AcceleratorInfo>,
}

/// Coarse runtime state used to decide whether a switch is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    NotInstalled,
    CpuOnly,
    Accelerated,
}

impl RuntimeReport {
    pub fn status(&self) -> RuntimeStatus {
        match (&self.torch_version, &self.accelerator) {
            (_, Some(_)) => RuntimeStatus::Accelerated,
            (Some(_), None) => RuntimeStatus::CpuOnly,
            (None, None) => RuntimeStatus::NotInstalled,
        }
    }
}

/// Source of runtime reports.
pub trait AcceleratorRuntime: Send + Sync {
    fn report(&self) -> RuntimeReport;
}

const PROBE_SCRIPT: &str = r#"
import json, importlib.util
r = {"torch": None, "onnxruntime": importlib.util.find_spec("onnxruntime") is not None, "accelerator": None}
try:
    import torch
    r["torch"] = torch.__version__
    if torch.cuda.is_available():
        p = torch.cuda.get_device_properties(0)
        r["accelerator"] = {"name": p.name, "vram_bytes": p.total_memory, "major": p.major, "minor": p.minor, "count": torch.cuda.device_count()}
except Exception:
    pass
print(json.dumps(r))
"#;

#[derive(Debug, Deserialize)]
struct RawReport {
    torch: Option<String>,
    #[serde(default)]
    onnxruntime: bool,
    accelerator: Option<RawAccelerator>,
}

#[derive(Debug, Deserialize)]
struct RawAccelerator {
    name: String,
    vram_bytes: Option<u64>,
    major: Option<u32>,
    minor: Option<u32>,
    #[serde(default = "one")]
    count: u32,
}

fn one() -> u32 {
    1
}

/// Probe that asks a Python interpreter what it has installed.
#[derive(Debug, Clone)]
pub struct PythonRuntimeProbe {
    python: PathBuf,
    timeout: Duration,
}

impl PythonRuntimeProbe {
    pub fn new(python: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
        }
    }
}

impl AcceleratorRuntime for PythonRuntimeProbe {
    fn report(&self) -> RuntimeReport {
        let mut cmd = Command::new(&self.python);
        cmd.args(["-c", PROBE_SCRIPT]);
        match run_blocking_with_timeout(&mut cmd, self.timeout) {
            Ok(output) if output.success() => parse_report(&output.stdout),
            Ok(output) => {
                debug!("Runtime probe exited with {:?}: {}", output.code, output.stderr.trim());
                RuntimeReport::default()
            }
            Err(e) => {
                debug!("Runtime probe failed: {}", e);
                RuntimeReport::default()
            }
        }
    }
}

/// Parse the probe script's output; the JSON object is the last line.
pub fn parse_report(stdout: &str) -> RuntimeReport {
    let Some(line) = stdout.lines().rev().map(str::trim).find(|l| l.starts_with('{')) else {
        debug!("Runtime probe printed no JSON");
        return RuntimeReport::default();
    };

    match serde_json::from_str::<RawReport>(line) {
        Ok(raw) => RuntimeReport {
            torch_version: raw.torch,
            onnxruntime: raw.onnxruntime,
            accelerator: raw.accelerator.map(|a| AcceleratorInfo {
                name: a.name,
                vram_bytes: a.vram_bytes,
                compute_tier: match (a.major, a.minor) {
                    (Some(major), Some(minor)) => Some(ComputeTier::new(major, minor)),
                    _ => None,
                },
                device_count: a.count,
            }),
        },
        Err(e) => {
            debug!("Unparseable runtime probe output: {}", e);
            RuntimeReport::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accelerated_report() {
        let stdout = "some warning\n{\"torch\": \"2.7.0+cu128\", \"onnxruntime\": true, \"accelerator\": {\"name\": \"NVIDIA RTX A4000\", \"vram_bytes\": 17171480576, \"major\": 8, \"minor\": 6, \"count\": 2}}\n";
        let report = parse_report(stdout);
        assert_eq!(report.status(), RuntimeStatus::Accelerated);
        let accel = report.accelerator.unwrap();
        assert_eq!(accel.compute_tier, Some(ComputeTier::new(8, 6)));
        assert_eq!(accel.device_count, 2);
        assert!(report.onnxruntime);
    }

    #[test]
    fn test_parse_cpu_only_and_missing() {
        let cpu = parse_report("{\"torch\": \"2.7.0+cpu\", \"onnxruntime\": false, \"accelerator\": null}");
        assert_eq!(cpu.status(), RuntimeStatus::CpuOnly);

        let none = parse_report("{\"torch\": null, \"onnxruntime\": false, \"accelerator\": null}");
        assert_eq!(none.status(), RuntimeStatus::NotInstalled);
    }

    #[test]
    fn test_garbage_yields_empty_report() {
        assert_eq!(parse_report("Traceback ..."), RuntimeReport::default());
        assert_eq!(parse_report("{not json"), RuntimeReport::default());
    }

    #[test]
    fn test_missing_interpreter_is_absorbed() {
        let probe = PythonRuntimeProbe::new("no-such-python-amv", Duration::from_secs(1));
        assert_eq!(probe.report().status(), RuntimeStatus::NotInstalled);
    }
}
