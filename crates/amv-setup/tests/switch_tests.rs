//! Integration tests for ModeSwitcher with scripted runtimes and commands.

use amv_core::platform::CapturedOutput;
use amv_core::system::{
    AcceleratorInfo, AcceleratorRuntime, ComputeTier, RuntimeReport, VendorDiagnostic,
};
use amv_core::{AuditLog, CancellationToken, CapabilityProbe, DeviceKind, ModeRecord, ModeStore, SetupType};
use amv_setup::{CommandExecutor, CommandRunner, ModeSwitcher, StepEvent, SwitchPlanner};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Reports CPU-only torch until `accelerated` is flipped.
#[derive(Default)]
struct SwitchableRuntime {
    accelerated: AtomicBool,
}

impl AcceleratorRuntime for SwitchableRuntime {
    fn report(&self) -> RuntimeReport {
        let accelerator = self.accelerated.load(Ordering::SeqCst).then(|| AcceleratorInfo {
            name: "NVIDIA GeForce RTX 4090".into(),
            vram_bytes: Some(24 * 1024 * 1024 * 1024),
            compute_tier: Some(ComputeTier { major: 8, minor: 9 }),
            device_count: 1,
        });
        RuntimeReport {
            torch_version: Some("2.7.0".into()),
            onnxruntime: true,
            accelerator,
        }
    }
}

struct NoVendor;

impl VendorDiagnostic for NoVendor {
    fn device_name(&self) -> Option<String> {
        None
    }
}

/// Succeeds every command except those with `fail_on` anywhere in argv.
/// A fully successful GPU install flips the runtime to accelerated.
struct PipScript {
    fail_on: Option<&'static str>,
    runtime: Arc<SwitchableRuntime>,
    seen: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl CommandExecutor for PipScript {
    async fn execute(&self, argv: &[String], _timeout: Duration) -> amv_core::Result<CapturedOutput> {
        self.seen.lock().unwrap().push(argv.to_vec());
        if let Some(needle) = self.fail_on {
            if argv.iter().any(|a| a.contains(needle)) {
                return Ok(CapturedOutput {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "ERROR: No matching distribution found\n".into(),
                });
            }
        }
        if argv.iter().any(|a| a.contains("audio-separator[gpu]")) {
            self.runtime.accelerated.store(true, Ordering::SeqCst);
        }
        Ok(CapturedOutput {
            code: Some(0),
            ..CapturedOutput::default()
        })
    }
}

struct Harness {
    _temp: TempDir,
    store: ModeStore,
    probe: Arc<CapabilityProbe>,
    script: Arc<PipScript>,
    audit: AuditLog,
}

fn harness(fail_on: Option<&'static str>, accelerated: bool) -> Harness {
    let temp = TempDir::new().unwrap();
    let store = ModeStore::new(temp.path().join("config.json"));
    let runtime = Arc::new(SwitchableRuntime::default());
    runtime.accelerated.store(accelerated, Ordering::SeqCst);
    let probe = Arc::new(CapabilityProbe::new(runtime.clone(), Arc::new(NoVendor)));
    let script = Arc::new(PipScript {
        fail_on,
        runtime,
        seen: Mutex::new(Vec::new()),
    });
    let audit = AuditLog::new(temp.path().join("logs"));
    Harness {
        _temp: temp,
        store,
        probe,
        script,
        audit,
    }
}

fn switcher(h: &Harness, token: CancellationToken) -> ModeSwitcher {
    ModeSwitcher::new(
        h.store.clone(),
        h.probe.clone(),
        SwitchPlanner::new("python"),
        CommandRunner::new(h.script.clone())
            .with_audit(h.audit.clone())
            .with_cancellation(token),
    )
}

fn stored(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_successful_gpu_switch_commits_and_refreshes_probe() {
    let h = harness(None, false);
    h.store.save(&ModeRecord::default().with_mode(SetupType::Cpu)).unwrap();
    h.probe.set_force_cpu(true);
    assert_eq!(h.probe.probe().device_kind, DeviceKind::Cpu);

    let outcome = switcher(&h, CancellationToken::new())
        .switch(SetupType::Gpu, |_| {})
        .await
        .unwrap();

    assert!(outcome.committed);
    assert_eq!(outcome.result.executed, 3);
    let value = stored(h.store.path());
    assert_eq!(value["setup_type"], "gpu");
    assert_eq!(value["force_cpu"], false);

    // Force-CPU lifted and cache refreshed against the new runtime.
    assert!(!h.probe.force_cpu());
    let descriptor = h.probe.probe();
    assert_eq!(descriptor.device_kind, DeviceKind::Gpu);
    assert!(descriptor.fp16_capable);
}

#[tokio::test]
async fn test_partial_failure_keeps_previous_mode() {
    let h = harness(Some("--index-url"), false);
    h.store.save(&ModeRecord::default()).unwrap();
    let before = std::fs::read_to_string(h.store.path()).unwrap();

    let mut events = Vec::new();
    let outcome = switcher(&h, CancellationToken::new())
        .switch(SetupType::Gpu, |e| events.push(e))
        .await
        .unwrap();

    // Step 2 failed, step 3 still ran.
    assert!(!outcome.committed);
    assert_eq!(outcome.result.errors.len(), 1);
    assert_eq!(outcome.result.errors[0].index, 2);
    assert_eq!(h.script.seen.lock().unwrap().len(), 3);
    assert!(events.contains(&StepEvent::Succeeded { index: 3 }));

    assert_eq!(std::fs::read_to_string(h.store.path()).unwrap(), before);
    assert_eq!(outcome.record.setup_type, SetupType::Cpu);

    let log = std::fs::read_to_string(h.audit.current_file()).unwrap();
    assert!(log.contains("No matching distribution"));
}

#[tokio::test]
async fn test_already_satisfied_runs_nothing_but_commits() {
    let h = harness(None, true);
    let outcome = switcher(&h, CancellationToken::new())
        .switch(SetupType::Gpu, |_| {})
        .await
        .unwrap();

    assert!(outcome.plan.already_satisfied);
    assert!(outcome.plan.is_empty());
    assert!(outcome.committed);
    assert!(h.script.seen.lock().unwrap().is_empty());
    assert_eq!(stored(h.store.path())["setup_type"], "gpu");
}

#[tokio::test]
async fn test_cancelled_switch_does_not_commit() {
    let h = harness(None, true);
    let token = CancellationToken::new();
    let cancel = token.clone();

    let outcome = switcher(&h, token)
        .switch(SetupType::Cpu, move |e| {
            if matches!(e, StepEvent::Succeeded { index: 1 }) {
                cancel.cancel();
            }
        })
        .await
        .unwrap();

    assert!(outcome.result.cancelled);
    assert!(!outcome.committed);
    assert_eq!(h.script.seen.lock().unwrap().len(), 1);
    assert!(!h.store.path().exists());
}

#[tokio::test]
async fn test_cpu_switch_persists_force_cpu() {
    let h = harness(None, true);
    let outcome = switcher(&h, CancellationToken::new())
        .switch(SetupType::Cpu, |_| {})
        .await
        .unwrap();

    assert!(outcome.committed);
    assert!(outcome.record.force_cpu);
    assert!(h.probe.force_cpu());
    assert_eq!(h.probe.probe().device_kind, DeviceKind::Cpu);
}
