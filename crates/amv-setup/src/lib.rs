//! AMV Setup - moving the machine between CPU and GPU runtimes.
//!
//! This crate provides:
//! - `planner` - ordered pip command plans for a target mode
//! - `runner` - sequential, cancellable plan execution with audit logging
//! - `classify` - one actionable message from a failed command's output
//! - `deps` - dependency check and install plan for missing components
//! - `switch` - plan, run, and commit the mode only on full success
//!
//! # Example
//!
//! ```rust,no_run
//! use amv_core::{SetupType, Toolkit};
//! use amv_setup::{CommandRunner, ModeSwitcher, SwitchPlanner};
//!
//! # async fn example() -> amv_core::Result<()> {
//! let toolkit = Toolkit::discover(None)?;
//! let switcher = ModeSwitcher::new(
//!     toolkit.store().clone(),
//!     toolkit.probe().clone(),
//!     SwitchPlanner::from_tools(toolkit.tools()),
//!     CommandRunner::process().with_audit(toolkit.audit().clone()),
//! );
//! let outcome = switcher.switch(SetupType::Gpu, |event| println!("{:?}", event)).await?;
//! println!("committed: {}", outcome.committed);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod deps;
pub mod planner;
pub mod runner;
pub mod switch;

pub use classify::{classify_failure, detect_os_failure, OsFailure};
pub use deps::{Component, ComponentStatus, DependencyChecker, DependencyReport};
pub use planner::{runtime_matches, CommandStep, SwitchPlan, SwitchPlanner};
pub use runner::{CommandExecutor, CommandRunner, ProcessExecutor, RunResult, StepError, StepEvent};
pub use switch::{ModeSwitcher, SwitchOutcome};
