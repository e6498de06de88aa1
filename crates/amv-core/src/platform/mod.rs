//! Platform abstraction layer.
//!
//! Everything that spawns an external program or reads its raw output goes
//! through here:
//! - `process` - bounded-time command execution, blocking and async
//! - `diagnostics` - picking the most useful line out of captured stderr

pub mod diagnostics;
pub mod process;

pub use diagnostics::{best_diagnostic_line, is_informational_line, tail_chars};
pub use process::{command_responds, run_async_with_timeout, run_blocking_with_timeout, CapturedOutput};

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "macos"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}
