//! One-shot process execution with a bounded wall-clock timeout.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::{
    error::{Result, RuntimeError},
    types::ScriptOutput,
};

/// Run `program` with `args`, capturing stdout/stderr as UTF-8 text and
/// the exit code.
///
/// The child is raced against `timeout`; on expiry it is killed
/// (SIGKILL) and [`RuntimeError::Timeout`] is returned. A missing
/// `program` binary is reported as [`RuntimeError::InterpreterMissing`],
/// distinct from a script-level failure.
pub async fn run_command(
    program: &str,
    args: &[&Path],
    extra_args: &[&str],
    timeout: Duration,
) -> Result<ScriptOutput> {
    debug!(%program, "spawning interpreter");

    let mut cmd = Command::new(program);
    for a in extra_args {
        cmd.arg(a);
    }
    for a in args {
        cmd.arg(a);
    }

    let child = cmd
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RuntimeError::InterpreterMissing {
                    interpreter: program.to_string(),
                }
            } else {
                RuntimeError::Spawn(format!("spawn failed: {e}"))
            }
        })?;

    // `wait_with_output` takes `self` by value, so we drive it on a spawned
    // task and keep the PID for the kill on the timeout path.
    let pid = child.id();
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let _ = tx.send(child.wait_with_output().await);
    });

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(Ok(output))) => Ok(ScriptOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),

        Ok(Ok(Err(e))) => Err(RuntimeError::Spawn(format!("wait failed: {e}"))),

        // The oneshot sender was dropped — the wait task panicked.
        Ok(Err(_recv_err)) => Err(RuntimeError::Spawn(
            "wait task panicked unexpectedly".to_string(),
        )),

        Err(_elapsed) => {
            warn!(%program, timeout_secs = timeout.as_secs(), "killing timed-out child");
            kill_child(pid);
            Err(RuntimeError::Timeout {
                secs: timeout.as_secs(),
            })
        }
    }
}

/// Terminate the child by PID. We no longer own the `Child` handle (it
/// moved into the wait task), so raw kill(2) is the reliable option.
fn kill_child(pid: Option<u32>) {
    let Some(raw_pid) = pid else { return };
    #[cfg(unix)]
    unsafe {
        libc::kill(raw_pid as libc::pid_t, libc::SIGKILL);
    }
    #[cfg(not(unix))]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/F", "/PID", &raw_pid.to_string()])
            .output();
    }
}
