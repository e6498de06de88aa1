//! Sequential execution of a command plan.
//!
//! Steps run strictly in order. A failed step is recorded and the run moves
//! on; the caller decides what a partial failure means. Cancellation is
//! checked between steps only, so a launched step always runs to completion
//! or to its timeout. Every invocation and its output go to the audit log.

use crate::classify::classify_failure;
use crate::planner::{CommandStep, SwitchPlan};
use amv_core::config::SetupConfig;
use amv_core::platform::{run_async_with_timeout, CapturedOutput};
use amv_core::{AmvError, AuditLog, CancellationToken, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runs one argument vector. The seam tests replace.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, argv: &[String], timeout: Duration) -> Result<CapturedOutput>;
}

/// Spawns real processes through tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, argv: &[String], timeout: Duration) -> Result<CapturedOutput> {
        run_async_with_timeout(argv, timeout).await
    }
}

/// A step that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepError {
    /// 1-based position in the plan.
    pub index: usize,
    pub label: String,
    pub message: String,
}

impl From<StepError> for AmvError {
    fn from(err: StepError) -> Self {
        AmvError::StepFailed {
            index: err.index,
            message: err.message,
        }
    }
}

/// Outcome of running a whole plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub errors: Vec<StepError>,
    /// Steps that were launched (informational steps are never launched).
    pub executed: usize,
    pub cancelled: bool,
}

impl RunResult {
    /// True only when every step ran and none failed.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }
}

/// Per-step notifications for the UI-owning side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StepEvent {
    Started { index: usize, total: usize, label: String },
    Manual { index: usize, label: String },
    Succeeded { index: usize },
    Failed { index: usize, message: String },
}

pub struct CommandRunner {
    executor: Arc<dyn CommandExecutor>,
    audit: Option<AuditLog>,
    step_timeout: Duration,
    cancel: CancellationToken,
}

impl CommandRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            audit: None,
            step_timeout: SetupConfig::STEP_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    /// Runner that spawns real processes.
    pub fn process() -> Self {
        Self::new(Arc::new(ProcessExecutor))
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run every step of `plan` in order.
    pub async fn run(&self, plan: &SwitchPlan, mut on_step: impl FnMut(StepEvent) + Send) -> RunResult {
        let total = plan.steps.len();
        let mut result = RunResult::default();

        for (i, step) in plan.steps.iter().enumerate() {
            let index = i + 1;
            if self.cancel.is_cancelled() {
                info!("Run cancelled before step {}/{}", index, total);
                self.audit_line(&format!("cancelled before step {}/{}", index, total));
                result.cancelled = true;
                break;
            }

            if step.is_informational {
                on_step(StepEvent::Manual {
                    index,
                    label: step.label.clone(),
                });
                continue;
            }

            on_step(StepEvent::Started {
                index,
                total,
                label: step.label.clone(),
            });
            result.executed += 1;

            match self.run_step(step).await {
                Ok(()) => on_step(StepEvent::Succeeded { index }),
                Err(message) => {
                    warn!("Step {}/{} ({}) failed: {}", index, total, step.label, message);
                    on_step(StepEvent::Failed {
                        index,
                        message: message.clone(),
                    });
                    result.errors.push(StepError {
                        index,
                        label: step.label.clone(),
                        message,
                    });
                }
            }
        }

        debug!(
            "Plan finished: {} executed, {} failed, cancelled={}",
            result.executed,
            result.errors.len(),
            result.cancelled
        );
        result
    }

    async fn run_step(&self, step: &CommandStep) -> std::result::Result<(), String> {
        if let Some(audit) = &self.audit {
            audit.command(&step.argv);
        }

        match self.executor.execute(&step.argv, self.step_timeout).await {
            Ok(output) => {
                if let Some(audit) = &self.audit {
                    audit.command_output(output.code, &output.stdout, &output.stderr);
                }
                if output.success() {
                    Ok(())
                } else {
                    Err(classify_failure(output.code, &output.stdout, &output.stderr))
                }
            }
            Err(e) => {
                self.audit_line(&format!("error: {}", e));
                Err(e.to_string())
            }
        }
    }

    fn audit_line(&self, text: &str) {
        if let Some(audit) = &self.audit {
            audit.append(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails any argv whose last element is in `fail`.
    #[derive(Default)]
    struct ScriptedExecutor {
        fail: Vec<&'static str>,
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn execute(&self, argv: &[String], _timeout: Duration) -> Result<CapturedOutput> {
            self.seen.lock().unwrap().push(argv.to_vec());
            let last = argv.last().map(String::as_str).unwrap_or_default();
            if last == "missing" {
                return Err(AmvError::ToolNotFound { tool: "pip".into() });
            }
            if self.fail.contains(&last) {
                return Ok(CapturedOutput {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: format!("Collecting {last}\nERROR: could not install {last}\n"),
                });
            }
            Ok(CapturedOutput {
                code: Some(0),
                ..CapturedOutput::default()
            })
        }
    }

    fn plan(names: &[&str]) -> SwitchPlan {
        SwitchPlan {
            target: amv_core::SetupType::Cpu,
            steps: names
                .iter()
                .map(|n| CommandStep::command(*n, vec!["pip".into(), n.to_string()]))
                .collect(),
            already_satisfied: false,
        }
    }

    #[tokio::test]
    async fn test_failed_step_does_not_stop_the_run() {
        let executor = Arc::new(ScriptedExecutor {
            fail: vec!["b"],
            ..Default::default()
        });
        let runner = CommandRunner::new(executor.clone());
        let mut events = Vec::new();
        let result = runner.run(&plan(&["a", "b", "c"]), |e| events.push(e)).await;

        assert_eq!(result.executed, 3);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].index, 2);
        assert_eq!(result.errors[0].message, "ERROR: could not install b");
        assert!(!result.is_success());
        assert_eq!(executor.seen.lock().unwrap().len(), 3);
        assert!(events.contains(&StepEvent::Succeeded { index: 3 }));
    }

    #[tokio::test]
    async fn test_spawn_errors_become_step_errors() {
        let runner = CommandRunner::new(Arc::new(ScriptedExecutor::default()));
        let result = runner.run(&plan(&["missing", "ok"]), |_| {}).await;
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("not found"));
        assert_eq!(result.executed, 2);
    }

    #[tokio::test]
    async fn test_cancel_between_steps() {
        let executor = Arc::new(ScriptedExecutor::default());
        let token = CancellationToken::new();
        let runner = CommandRunner::new(executor.clone()).with_cancellation(token.clone());

        let result = runner
            .run(&plan(&["a", "b", "c"]), |e| {
                if e == (StepEvent::Succeeded { index: 1 }) {
                    token.cancel();
                }
            })
            .await;

        assert!(result.cancelled);
        assert!(!result.is_success());
        assert_eq!(result.executed, 1);
        assert_eq!(executor.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_informational_steps_are_reported_not_run() {
        let executor = Arc::new(ScriptedExecutor::default());
        let runner = CommandRunner::new(executor.clone());
        let mut steps = plan(&["a"]);
        steps.steps.insert(0, CommandStep::informational("Install FFmpeg manually"));

        let mut events = Vec::new();
        let result = runner.run(&steps, |e| events.push(e)).await;

        assert!(result.is_success());
        assert_eq!(result.executed, 1);
        assert_eq!(
            events[0],
            StepEvent::Manual {
                index: 1,
                label: "Install FFmpeg manually".into()
            }
        );
        assert_eq!(executor.seen.lock().unwrap()[0], vec!["pip", "a"]);
    }

    #[tokio::test]
    async fn test_steps_are_audited() {
        let temp = tempfile::TempDir::new().unwrap();
        let audit = AuditLog::new(temp.path());
        let runner = CommandRunner::new(Arc::new(ScriptedExecutor {
            fail: vec!["b"],
            ..Default::default()
        }))
        .with_audit(audit.clone());
        runner.run(&plan(&["a", "b"]), |_| {}).await;

        let log = std::fs::read_to_string(audit.current_file()).unwrap();
        assert!(log.contains("$ pip a"));
        assert!(log.contains("$ pip b"));
        assert!(log.contains("exit=1"));
        assert!(log.contains("ERROR: could not install b"));
    }
}
