//! Dependency check and the install plan for whatever is missing.

use crate::planner::{CommandStep, SwitchPlan, SwitchPlanner};
use crate::runner::{CommandExecutor, ProcessExecutor};
use amv_core::config::{SetupConfig, ToolPaths};
use amv_core::SetupType;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Something the toolkit needs installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    Ffmpeg,
    YtDlp,
    AudioSeparator,
    OnnxRuntime,
    Torch,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::Torch,
        Component::OnnxRuntime,
        Component::Ffmpeg,
        Component::YtDlp,
        Component::AudioSeparator,
    ];

    /// Python distribution name, for pip-managed components.
    pub fn package(&self) -> Option<&'static str> {
        match self {
            Component::Ffmpeg => None,
            Component::YtDlp => Some("yt-dlp"),
            Component::AudioSeparator => Some("audio-separator"),
            Component::OnnxRuntime => Some("onnxruntime"),
            Component::Torch => Some("torch"),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Ffmpeg => write!(f, "FFmpeg"),
            Component::YtDlp => write!(f, "yt-dlp"),
            Component::AudioSeparator => write!(f, "audio-separator"),
            Component::OnnxRuntime => write!(f, "ONNX Runtime"),
            Component::Torch => write!(f, "PyTorch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentStatus {
    pub component: Component,
    pub installed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    pub components: Vec<ComponentStatus>,
}

impl DependencyReport {
    pub fn missing(&self) -> Vec<Component> {
        self.components
            .iter()
            .filter(|s| !s.installed)
            .map(|s| s.component)
            .collect()
    }

    pub fn all_installed(&self) -> bool {
        self.components.iter().all(|s| s.installed)
    }

    pub fn is_installed(&self, component: Component) -> bool {
        self.components
            .iter()
            .any(|s| s.component == component && s.installed)
    }
}

/// Checks command-line tools and Python packages.
pub struct DependencyChecker {
    executor: Arc<dyn CommandExecutor>,
    planner: SwitchPlanner,
    python: PathBuf,
    ffmpeg: PathBuf,
    yt_dlp: PathBuf,
}

impl DependencyChecker {
    pub fn new(tools: &ToolPaths, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            planner: SwitchPlanner::from_tools(tools),
            python: tools.python.clone(),
            ffmpeg: tools.ffmpeg.clone(),
            yt_dlp: tools.yt_dlp.clone(),
        }
    }

    pub fn from_tools(tools: &ToolPaths) -> Self {
        Self::new(tools, Arc::new(ProcessExecutor))
    }

    /// Check every component. Never fails; an unreachable check counts as missing.
    pub async fn check(&self) -> DependencyReport {
        let mut components = Vec::with_capacity(Component::ALL.len());
        for component in Component::ALL {
            let installed = match component {
                Component::Ffmpeg => self.responds(&self.ffmpeg).await,
                Component::YtDlp => self.responds(&self.yt_dlp).await,
                other => match other.package() {
                    Some(package) => self.package_installed(package).await,
                    None => false,
                },
            };
            debug!("{}: {}", component, if installed { "installed" } else { "missing" });
            components.push(ComponentStatus { component, installed });
        }
        DependencyReport { components }
    }

    /// Install steps for every missing component, CPU builds.
    ///
    /// FFmpeg cannot be pip-installed; it becomes an informational step.
    pub fn install_plan(&self, report: &DependencyReport) -> SwitchPlan {
        let steps = report
            .missing()
            .into_iter()
            .map(|component| match component {
                Component::Ffmpeg => {
                    CommandStep::informational("Download FFmpeg from ffmpeg.org and add it to PATH")
                }
                Component::Torch => {
                    let mut argv = self.planner.pip(&["install"]);
                    argv.extend(SetupConfig::RUNTIME_PACKAGES.iter().map(|p| p.to_string()));
                    argv.extend(["--index-url".to_string(), SetupConfig::CPU_INDEX_URL.to_string()]);
                    CommandStep::command("Installing PyTorch (CPU)", argv)
                }
                other => {
                    let package = other.package().unwrap_or_default();
                    CommandStep::command(format!("Installing {}", other), self.planner.pip(&["install", package]))
                }
            })
            .collect();

        SwitchPlan {
            target: SetupType::Cpu,
            steps,
            already_satisfied: report.all_installed(),
        }
    }

    async fn responds(&self, program: &std::path::Path) -> bool {
        let argv = vec![program.to_string_lossy().to_string(), "--version".to_string()];
        self.executor
            .execute(&argv, SetupConfig::QUICK_TIMEOUT)
            .await
            .is_ok()
    }

    async fn package_installed(&self, package: &str) -> bool {
        let mut argv = vec![self.python.to_string_lossy().to_string()];
        argv.extend(["-m", "pip", "show", package].iter().map(|a| a.to_string()));
        matches!(
            self.executor.execute(&argv, SetupConfig::PROBE_TIMEOUT).await,
            Ok(output) if output.success()
        )
    }
}
