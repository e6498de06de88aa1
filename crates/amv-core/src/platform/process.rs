//! Bounded-time execution of external commands.
//!
//! Commands are always built from argument vectors, never shell strings, so
//! interpreter paths with spaces survive intact.

use crate::error::{AmvError, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Run a blocking command, killing it if it outlives `timeout`.
///
/// Both pipes are drained on helper threads so a chatty child cannot
/// deadlock on a full pipe while we wait for it.
pub fn run_blocking_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<CapturedOutput> {
    let program = cmd.get_program().to_string_lossy().to_string();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(&program, e))?;

    let stdout_reader = child.stdout.take().map(drain_on_thread);
    let stderr_reader = child.stderr.take().map(drain_on_thread);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                debug!("{} exceeded {:?}, killing", program, timeout);
                let _ = child.kill();
                let _ = child.wait();
                return Err(AmvError::Timeout {
                    what: program,
                    after: timeout,
                });
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }
    };

    Ok(CapturedOutput {
        code: status.code(),
        stdout: join_reader(stdout_reader),
        stderr: join_reader(stderr_reader),
    })
}

/// Run an async command to completion, capturing both streams fully.
///
/// The child is killed if the timeout elapses first.
pub async fn run_async_with_timeout(argv: &[String], timeout: Duration) -> Result<CapturedOutput> {
    let (program, args) = argv.split_first().ok_or_else(|| AmvError::Validation {
        field: "argv".into(),
        message: "empty command".into(),
    })?;

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| spawn_error(program, e))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CapturedOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }),
        Ok(Err(e)) => Err(AmvError::ToolFailed {
            tool: program.clone(),
            message: e.to_string(),
        }),
        Err(_) => Err(AmvError::Timeout {
            what: program.clone(),
            after: timeout,
        }),
    }
}

/// True if `<program> --version` exits within `timeout`, whatever its code.
pub fn command_responds(program: &Path, timeout: Duration) -> bool {
    let mut cmd = Command::new(program);
    cmd.arg("--version");
    match run_blocking_with_timeout(&mut cmd, timeout) {
        Ok(_) => true,
        Err(e) => {
            debug!("{} unavailable: {}", program.display(), e);
            false
        }
    }
}

fn spawn_error(program: &str, err: std::io::Error) -> AmvError {
    if err.kind() == std::io::ErrorKind::NotFound {
        AmvError::ToolNotFound {
            tool: program.to_string(),
        }
    } else {
        AmvError::ToolFailed {
            tool: program.to_string(),
            message: format!("failed to start: {}", err),
        }
    }
}

fn drain_on_thread<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).to_string())
        .unwrap_or_default()
}
