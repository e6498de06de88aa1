//! Static separation-model registry and hardware-based model selection.
//!
//! Selection is a pure function of the capability descriptor. The
//! high-quality model needs both an accelerator and an installed accelerated
//! runtime; a GPU that nvidia-smi can see but torch cannot use still gets
//! the CPU-portable model with CPU settings.

use crate::system::CapabilityDescriptor;
use serde::Serialize;

/// Model file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    Onnx,
    TensorGraph,
}

/// Per-device inference overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuntimeSettings {
    pub fp16: bool,
    pub batch_size: u32,
}

impl RuntimeSettings {
    /// Settings that run anywhere.
    pub const CPU_SAFE: RuntimeSettings = RuntimeSettings {
        fp16: false,
        batch_size: 1,
    };
}

/// Registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    pub id: &'static str,
    pub display_name: &'static str,
    pub kind: ModelKind,
    pub cpu_settings: RuntimeSettings,
    pub gpu_settings: Option<RuntimeSettings>,
}

/// Lightweight ONNX model, CPU-portable.
pub const KIM_VOCAL_2: ModelSpec = ModelSpec {
    id: "Kim_Vocal_2.onnx",
    display_name: "Kim Vocal 2 (ONNX)",
    kind: ModelKind::Onnx,
    cpu_settings: RuntimeSettings::CPU_SAFE,
    gpu_settings: None,
};

/// Best-quality model, worth it only with half precision on an accelerator.
pub const BS_ROFORMER: ModelSpec = ModelSpec {
    id: "model_bs_roformer_ep_317_sdr_12.9755.ckpt",
    display_name: "BS-Roformer (Best Quality)",
    kind: ModelKind::TensorGraph,
    cpu_settings: RuntimeSettings::CPU_SAFE,
    gpu_settings: Some(RuntimeSettings {
        fp16: true,
        batch_size: 1,
    }),
};

const REGISTRY: [ModelSpec; 2] = [KIM_VOCAL_2, BS_ROFORMER];

/// All known models.
pub fn registry() -> &'static [ModelSpec] {
    &REGISTRY
}

/// Find a model by file name.
pub fn lookup(id: &str) -> Option<&'static ModelSpec> {
    REGISTRY.iter().find(|m| m.id == id)
}

/// Human-readable name, falling back to the id for unknown models.
pub fn display_name(id: &str) -> &str {
    lookup(id).map(|m| m.display_name).unwrap_or(id)
}

/// Settings for an arbitrary model id on the given device.
///
/// Unknown ids get CPU-safe settings.
pub fn settings_for(id: &str, use_gpu: bool) -> RuntimeSettings {
    match lookup(id) {
        Some(spec) if use_gpu => spec.gpu_settings.unwrap_or(spec.cpu_settings),
        Some(spec) => spec.cpu_settings,
        None => RuntimeSettings::CPU_SAFE,
    }
}

/// Choose the model and its settings for a descriptor.
pub fn select(descriptor: &CapabilityDescriptor) -> (ModelSpec, RuntimeSettings) {
    let gpu_path = descriptor.is_gpu() && descriptor.fp16_capable;
    if gpu_path {
        let settings = BS_ROFORMER.gpu_settings.unwrap_or(BS_ROFORMER.cpu_settings);
        (BS_ROFORMER, settings)
    } else {
        (KIM_VOCAL_2, KIM_VOCAL_2.cpu_settings)
    }
}
