//! Switching the machine between CPU and GPU execution.
//!
//! The new mode is committed to disk only when the plan was already
//! satisfied or every step succeeded. A partial failure or a cancellation
//! leaves the stored mode as it was.

use crate::planner::{SwitchPlan, SwitchPlanner};
use crate::runner::{CommandRunner, RunResult, StepEvent};
use amv_core::{AmvError, CapabilityProbe, ModeRecord, ModeStore, Result, RuntimeStatus, SetupType};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// What a switch request did.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchOutcome {
    pub plan: SwitchPlan,
    pub result: RunResult,
    /// The stored mode now reflects the target.
    pub committed: bool,
    /// Stored mode after the request, committed or not.
    pub record: ModeRecord,
}

pub struct ModeSwitcher {
    store: ModeStore,
    probe: Arc<CapabilityProbe>,
    planner: SwitchPlanner,
    runner: CommandRunner,
}

impl ModeSwitcher {
    pub fn new(store: ModeStore, probe: Arc<CapabilityProbe>, planner: SwitchPlanner, runner: CommandRunner) -> Self {
        Self {
            store,
            probe,
            planner,
            runner,
        }
    }

    /// Live runtime state. The probe shells out, so it runs off the async threads.
    pub async fn runtime_status(&self) -> Result<RuntimeStatus> {
        let probe = Arc::clone(&self.probe);
        tokio::task::spawn_blocking(move || probe.runtime_status())
            .await
            .map_err(|e| AmvError::Other(format!("Runtime probe task failed: {}", e)))
    }

    /// Plan, run and, on full success, persist `target`.
    pub async fn switch(&self, target: SetupType, on_step: impl FnMut(StepEvent) + Send) -> Result<SwitchOutcome> {
        let current = self.store.load().record;
        let status = self.runtime_status().await?;
        let plan = self.planner.plan(&current, target, status);

        let result = if plan.already_satisfied {
            info!("Runtime already serves {}, skipping install", target);
            RunResult::default()
        } else {
            info!("Switching to {} in {} step(s)", target, plan.steps.len());
            self.runner.run(&plan, on_step).await
        };

        if !result.is_success() {
            if result.cancelled {
                info!("Switch to {} cancelled; keeping {}", target, current.setup_type);
            } else {
                warn!(
                    "Switch to {} failed in {} step(s); keeping {}",
                    target,
                    result.errors.len(),
                    current.setup_type
                );
            }
            return Ok(SwitchOutcome {
                plan,
                result,
                committed: false,
                record: current,
            });
        }

        let record = current.with_mode(target);
        self.store.save(&record)?;
        self.probe.set_force_cpu(record.force_cpu);
        // The installed runtime changed underneath the cached descriptor.
        self.probe.invalidate();
        info!("Mode set to {}", target);

        Ok(SwitchOutcome {
            plan,
            result,
            committed: true,
            record,
        })
    }
}
