//! Hardware and runtime capability detection.
//!
//! - `capability` - the immutable [`CapabilityDescriptor`] snapshot
//! - `runtime` - what the accelerated tensor runtime reports, if installed
//! - `gpu` - vendor tools that see hardware without a runtime
//! - `probe` - cached, single-flight detection combining the above
//!
//! Detection never fails outward. Every missing tool or bad output degrades
//! to "not found" and finally to a CPU descriptor.

mod capability;
mod gpu;
mod probe;
mod runtime;

pub use capability::{
    CapabilityDescriptor, ComputeTier, DeviceKind, FORCED_CPU_NAME, PROVIDER_CPU, PROVIDER_CPU_ONNX,
    PROVIDER_CUDA, PROVIDER_NEEDS_SETUP,
};
pub use gpu::{NvidiaSmi, VendorDiagnostic};
pub use probe::CapabilityProbe;
pub use runtime::{
    parse_report, AcceleratorInfo, AcceleratorRuntime, PythonRuntimeProbe, RuntimeReport, RuntimeStatus,
};
