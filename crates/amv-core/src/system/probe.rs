//! Cached capability detection.
//!
//! The cache holds an `Arc` snapshot. Readers clone the `Arc` and never see
//! a half-built descriptor; refresh swaps in a whole new snapshot. Detection
//! itself is serialized by a separate mutex so concurrent first callers run
//! it once and share the result.

use crate::config::{SetupConfig, ToolPaths};
use crate::system::capability::CapabilityDescriptor;
use crate::system::gpu::{NvidiaSmi, VendorDiagnostic};
use crate::system::runtime::{AcceleratorRuntime, PythonRuntimeProbe, RuntimeStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

pub struct CapabilityProbe {
    runtime: Arc<dyn AcceleratorRuntime>,
    vendor: Arc<dyn VendorDiagnostic>,
    force_cpu: AtomicBool,
    snapshot: RwLock<Option<Arc<CapabilityDescriptor>>>,
    detect_lock: Mutex<()>,
}

impl CapabilityProbe {
    pub fn new(runtime: Arc<dyn AcceleratorRuntime>, vendor: Arc<dyn VendorDiagnostic>) -> Self {
        Self {
            runtime,
            vendor,
            force_cpu: AtomicBool::new(false),
            snapshot: RwLock::new(None),
            detect_lock: Mutex::new(()),
        }
    }

    /// Probe backed by the configured Python interpreter and nvidia-smi.
    pub fn from_tools(tools: &ToolPaths) -> Self {
        Self::new(
            Arc::new(PythonRuntimeProbe::new(&tools.python, SetupConfig::PROBE_TIMEOUT)),
            Arc::new(NvidiaSmi::new(&tools.nvidia_smi, SetupConfig::QUICK_TIMEOUT)),
        )
    }

    /// Builder-style force-CPU flag.
    pub fn with_force_cpu(self, force_cpu: bool) -> Self {
        self.force_cpu.store(force_cpu, Ordering::SeqCst);
        self
    }

    /// Change the force-CPU setting, dropping the cached snapshot if it changed.
    pub fn set_force_cpu(&self, force_cpu: bool) {
        if self.force_cpu.swap(force_cpu, Ordering::SeqCst) != force_cpu {
            self.invalidate();
        }
    }

    pub fn force_cpu(&self) -> bool {
        self.force_cpu.load(Ordering::SeqCst)
    }

    /// Current descriptor, detecting on first use.
    pub fn probe(&self) -> Arc<CapabilityDescriptor> {
        if let Some(cached) = self.cached() {
            return cached;
        }

        let _guard = self.detect_lock.lock().unwrap_or_else(|e| e.into_inner());
        // Another caller may have finished detection while we waited.
        if let Some(cached) = self.cached() {
            return cached;
        }

        let descriptor = Arc::new(self.detect());
        info!("Detected capability: {}", descriptor);
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&descriptor));
        descriptor
    }

    /// Forget the cached descriptor; the next `probe()` detects again.
    pub fn invalidate(&self) {
        let _guard = self.detect_lock.lock().unwrap_or_else(|e| e.into_inner());
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = None;
        debug!("Capability cache invalidated");
    }

    /// Live runtime state, never cached. Installs change it underneath us.
    pub fn runtime_status(&self) -> RuntimeStatus {
        self.runtime.report().status()
    }

    fn cached(&self) -> Option<Arc<CapabilityDescriptor>> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(Arc::clone)
    }

    fn detect(&self) -> CapabilityDescriptor {
        if self.force_cpu() {
            return CapabilityDescriptor::forced_cpu();
        }

        let report = self.runtime.report();
        if let Some(accel) = &report.accelerator {
            return CapabilityDescriptor::from_accelerator(accel);
        }

        if let Some(name) = self.vendor.device_name() {
            debug!("Accelerator {} present without an accelerated runtime", name);
            return CapabilityDescriptor::from_vendor(name);
        }

        CapabilityDescriptor::cpu(report.onnxruntime)
    }
}
