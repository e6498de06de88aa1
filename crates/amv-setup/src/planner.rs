//! Ordered command plans for moving between CPU and GPU runtimes.

use amv_core::config::{SetupConfig, ToolPaths};
use amv_core::{ModeRecord, RuntimeStatus, SetupType};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One external command in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandStep {
    /// Short human description.
    pub label: String,
    pub argv: Vec<String>,
    /// Reported to the user but never executed (manual actions).
    pub is_informational: bool,
}

impl CommandStep {
    pub fn command(label: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            label: label.into(),
            argv,
            is_informational: false,
        }
    }

    pub fn informational(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            argv: Vec::new(),
            is_informational: true,
        }
    }
}

/// Steps to reach a target mode. Built per request and consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchPlan {
    pub target: SetupType,
    pub steps: Vec<CommandStep>,
    /// The installed runtime already matches the target; nothing to run.
    pub already_satisfied: bool,
}

impl SwitchPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps that will actually run.
    pub fn executable_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.is_informational).count()
    }
}

/// True when the live runtime already serves `target`.
pub fn runtime_matches(target: SetupType, status: RuntimeStatus) -> bool {
    match target {
        SetupType::Gpu => status == RuntimeStatus::Accelerated,
        SetupType::Cpu => status == RuntimeStatus::CpuOnly,
    }
}

/// Builds pip command sequences against one interpreter.
#[derive(Debug, Clone)]
pub struct SwitchPlanner {
    python: PathBuf,
}

impl SwitchPlanner {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self { python: python.into() }
    }

    pub fn from_tools(tools: &ToolPaths) -> Self {
        Self::new(&tools.python)
    }

    /// Plan the move from `current` to `target`.
    ///
    /// `status` must come from a live probe. When it already matches the
    /// target the plan is empty, even if the stored record says otherwise.
    pub fn plan(&self, current: &ModeRecord, target: SetupType, status: RuntimeStatus) -> SwitchPlan {
        if runtime_matches(target, status) {
            if current.setup_type != target {
                warn!(
                    "Stored mode is {} but the installed runtime already serves {}",
                    current.setup_type, target
                );
            }
            debug!("Runtime already {:?}, nothing to install for {}", status, target);
            return SwitchPlan {
                target,
                steps: Vec::new(),
                already_satisfied: true,
            };
        }

        SwitchPlan {
            target,
            steps: self.steps_for(target),
            already_satisfied: false,
        }
    }

    /// Uninstall the runtime, install the target build, install the backend.
    ///
    /// onnxruntime is never uninstalled; the separator needs it in both modes.
    pub fn steps_for(&self, target: SetupType) -> Vec<CommandStep> {
        let (index_url, backend): (&str, &[&str]) = match target {
            SetupType::Gpu => (SetupConfig::GPU_INDEX_URL, &SetupConfig::GPU_BACKEND_PACKAGES),
            SetupType::Cpu => (SetupConfig::CPU_INDEX_URL, &SetupConfig::CPU_BACKEND_PACKAGES),
        };

        let mut uninstall = self.pip(&["uninstall", "-y"]);
        uninstall.extend(SetupConfig::RUNTIME_PACKAGES.iter().map(|p| p.to_string()));

        let mut install = self.pip(&["install"]);
        install.extend(SetupConfig::RUNTIME_PACKAGES.iter().map(|p| p.to_string()));
        install.extend(["--index-url".to_string(), index_url.to_string()]);

        let mut backend_install = self.pip(&["install"]);
        backend_install.extend(backend.iter().map(|p| p.to_string()));

        vec![
            CommandStep::command("Removing current PyTorch build", uninstall),
            CommandStep::command(format!("Installing {} PyTorch build", target.as_str().to_uppercase()), install),
            CommandStep::command(format!("Installing {}", backend.join(" ")), backend_install),
        ]
    }

    /// `python -m pip <args>` as an argument vector.
    pub fn pip(&self, args: &[&str]) -> Vec<String> {
        let mut argv = vec![self.python.to_string_lossy().to_string(), "-m".into(), "pip".into()];
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }
}
