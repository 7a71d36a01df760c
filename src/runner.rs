//! Launching VBoxManage.
//!
//! Arguments are always passed as a list straight to the process, never
//! through a shell, so machine names with spaces or quotes stay intact.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use crate::error::VkdError;

/// How a command invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited; `0` is success.
    Exited(i32),
    /// The bounded wait elapsed and the process was killed.
    TimedOut,
}

impl RunOutcome {
    pub fn success(self) -> bool {
        matches!(self, RunOutcome::Exited(0))
    }
}

#[allow(async_fn_in_trait)] // trait is internal-only
pub trait CommandRunner {
    /// Run `program` with `args`, blocking the caller until it exits or
    /// `timeout` elapses. Errors only when the process cannot be started.
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        timeout: Duration,
    ) -> Result<RunOutcome, VkdError>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        timeout: Duration,
    ) -> Result<RunOutcome, VkdError> {
        let mut cmd = command(program, args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|source| VkdError::Io {
            context: format!("running {}", program.display()),
            source,
        })?;

        let waited = tokio::time::timeout(timeout, child.wait()).await;
        match waited {
            Ok(Ok(status)) => {
                // A signal-terminated child has no code; report it as a failure.
                let code = status.code().unwrap_or(-1);
                tracing::debug!(program = %program.display(), code, "command exited");
                Ok(RunOutcome::Exited(code))
            }
            Ok(Err(source)) => Err(VkdError::Io {
                context: format!("waiting for {}", program.display()),
                source,
            }),
            Err(_) => {
                tracing::warn!(
                    program = %program.display(),
                    timeout_s = timeout.as_secs(),
                    "command timed out, killing it"
                );
                let _ = child.kill().await;
                Ok(RunOutcome::TimedOut)
            }
        }
    }
}

/// Run a command and capture its output, for read-only queries.
pub async fn capture(
    program: &Path,
    args: &[&str],
    timeout: Duration,
) -> Result<Output, VkdError> {
    let mut cmd = command(program, args);
    cmd.stdin(Stdio::null());

    let unreachable = |message: String| VkdError::HostUnreachable { message };

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(unreachable(format!(
            "failed to run {}: {e}",
            program.display()
        ))),
        Err(_) => Err(unreachable(format!(
            "{} did not answer within {}s",
            program.display(),
            timeout.as_secs()
        ))),
    }
}

fn command<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args).kill_on_drop(true);
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}
