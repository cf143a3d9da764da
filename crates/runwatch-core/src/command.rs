//! Subprocess execution for CLI-backed collaborators.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable.
    pub program: String,

    /// Arguments, not including the executable.
    pub args: Vec<String>,

    /// Working directory (inherits the caller's if `None`).
    pub cwd: Option<PathBuf>,

    /// Upper bound on execution time (unbounded if `None`).
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            timeout: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `program arg1 arg2 ...`, for log lines.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (-1 if terminated by a signal).
    pub exit_code: i32,

    /// Captured stdout, decoded lossily.
    pub stdout: String,

    /// Captured stderr, decoded lossily.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the process exited successfully.
    pub success: bool,
}

impl CommandOutput {
    /// Stdout on success; otherwise a transient error carrying stderr.
    pub fn into_stdout(self, spec: &CommandSpec) -> RemoteResult<String> {
        if self.success {
            return Ok(self.stdout);
        }
        let stderr = self.stderr.trim();
        Err(RemoteError::Transient(if stderr.is_empty() {
            format!("`{}` exited with code {}", spec.display(), self.exit_code)
        } else {
            format!(
                "`{}` exited with code {}: {}",
                spec.display(),
                self.exit_code,
                stderr
            )
        }))
    }
}

/// Run a command to completion, capturing output.
///
/// A missing executable is [`RemoteError::Fatal`]; a timeout is
/// [`RemoteError::Transient`]. A non-zero exit is *not* an error here; the
/// caller decides what it means.
pub async fn run_command(spec: &CommandSpec) -> RemoteResult<CommandOutput> {
    let start = Instant::now();

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }

    let child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RemoteError::Fatal(format!("{} not found: {e}", spec.program))
        } else {
            RemoteError::Fatal(format!("failed to run {}: {e}", spec.program))
        }
    })?;

    let output = match spec.timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| {
                RemoteError::Transient(format!(
                    "`{}` timed out after {} seconds",
                    spec.display(),
                    limit.as_secs()
                ))
            })?,
        None => child.wait_with_output().await,
    }
    .map_err(|e| RemoteError::Transient(format!("`{}` failed: {e}", spec.display())))?;

    let duration_ms = start.elapsed().as_millis() as u64;
    let exit_code = output.status.code().unwrap_or(-1);
    debug!(command = %spec.display(), exit_code, duration_ms, "command finished");

    Ok(CommandOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration_ms,
        success: output.status.success(),
    })
}
