//! Immutable snapshot of detected hardware and runtime state.

use crate::mode::SetupType;
use crate::system::runtime::AcceleratorInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of device inference will run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Gpu => write!(f, "gpu"),
        }
    }
}

/// Accelerator compute capability, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComputeTier {
    pub major: u32,
    pub minor: u32,
}

impl ComputeTier {
    /// Lowest tier with usable half-precision tensor cores.
    pub const FP16: ComputeTier = ComputeTier { major: 7, minor: 0 };
    /// Lowest tier with FP8 support.
    pub const FP8: ComputeTier = ComputeTier { major: 8, minor: 9 };

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ComputeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

pub const PROVIDER_CUDA: &str = "CUDAExecutionProvider";
pub const PROVIDER_CPU_ONNX: &str = "CPUExecutionProvider";
pub const PROVIDER_CPU: &str = "CPU";
pub const PROVIDER_NEEDS_SETUP: &str = "CPU (run setup to install CUDA)";
pub const FORCED_CPU_NAME: &str = "CPU (Forced)";

/// Detected capability. Never mutated after construction; a refresh builds
/// a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub device_kind: DeviceKind,
    pub device_name: String,
    pub vram_bytes: Option<u64>,
    pub compute_tier: Option<ComputeTier>,
    pub fp16_capable: bool,
    pub fp8_capable: bool,
    pub runtime_provider: String,
}

impl CapabilityDescriptor {
    /// Plain CPU descriptor.
    pub fn cpu(onnxruntime_present: bool) -> Self {
        Self {
            device_kind: DeviceKind::Cpu,
            device_name: "CPU".to_string(),
            vram_bytes: None,
            compute_tier: None,
            fp16_capable: false,
            fp8_capable: false,
            runtime_provider: if onnxruntime_present {
                PROVIDER_CPU_ONNX
            } else {
                PROVIDER_CPU
            }
            .to_string(),
        }
    }

    /// Descriptor for a user who asked for CPU regardless of hardware.
    pub fn forced_cpu() -> Self {
        Self {
            device_name: FORCED_CPU_NAME.to_string(),
            runtime_provider: PROVIDER_CPU.to_string(),
            ..Self::cpu(false)
        }
    }

    /// Accelerator reported by an initialized accelerated runtime.
    pub fn from_accelerator(info: &AcceleratorInfo) -> Self {
        let tier = info.compute_tier;
        Self {
            device_kind: DeviceKind::Gpu,
            device_name: info.name.clone(),
            vram_bytes: info.vram_bytes,
            compute_tier: tier,
            fp16_capable: tier.is_some_and(|t| t >= ComputeTier::FP16),
            fp8_capable: tier.is_some_and(|t| t >= ComputeTier::FP8),
            runtime_provider: PROVIDER_CUDA.to_string(),
        }
    }

    /// Accelerator found only by the vendor tool. Without the matching
    /// runtime there is no usable tensor-core path.
    pub fn from_vendor(name: impl Into<String>) -> Self {
        Self {
            device_kind: DeviceKind::Gpu,
            device_name: name.into(),
            vram_bytes: None,
            compute_tier: None,
            fp16_capable: false,
            fp8_capable: false,
            runtime_provider: PROVIDER_NEEDS_SETUP.to_string(),
        }
    }

    pub fn is_gpu(&self) -> bool {
        self.device_kind == DeviceKind::Gpu
    }

    /// Device name without vendor boilerplate, for narrow status lines.
    pub fn device_short(&self) -> String {
        self.device_name
            .replace("NVIDIA ", "")
            .replace("GeForce ", "")
            .trim()
            .to_string()
    }

    /// VRAM in GiB with one decimal, or `None` when unknown.
    pub fn vram_display(&self) -> Option<String> {
        self.vram_bytes
            .map(|b| format!("{:.1} GB", b as f64 / 1024f64.powi(3)))
    }

    /// Mode a fresh install should default to.
    pub fn suggested_mode(&self) -> SetupType {
        if self.is_gpu() {
            SetupType::Gpu
        } else {
            SetupType::Cpu
        }
    }
}

impl fmt::Display for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.device_name, self.runtime_provider)?;
        if let Some(vram) = self.vram_display() {
            write!(f, " {}", vram)?;
        }
        if let Some(tier) = self.compute_tier {
            write!(f, " sm_{}", tier)?;
        }
        Ok(())
    }
}
