//! Per-runtime interpreter selection and script execution.

use std::time::Duration;

use autotask_core::config::SCRIPT_TIMEOUT_SECS;
use autotask_core::types::ScriptType;

use crate::{
    error::{Result, RuntimeError},
    runner::run_command,
    stage::stage_script,
    types::ScriptOutput,
};

/// How one script runtime is invoked on this host.
struct InterpreterSpec {
    program: &'static str,
    /// Arguments that come before the script path.
    pre_args: &'static [&'static str],
    extension: &'static str,
    /// Whether the staged file needs the execute bit.
    executable: bool,
}

/// Resolve the interpreter for `script_type`, or fail when the runtime is
/// a documented platform restriction on this host.
///
/// The match is exhaustive over [`ScriptType`] — adding a runtime without
/// an arm here is a compile error.
fn interpreter_for(script_type: ScriptType) -> Result<InterpreterSpec> {
    match script_type {
        ScriptType::Python => Ok(InterpreterSpec {
            program: if cfg!(windows) { "python" } else { "python3" },
            pre_args: &[],
            extension: ".py",
            executable: false,
        }),
        ScriptType::Bash => {
            // Documented restriction: no native bash on Windows hosts.
            if cfg!(windows) {
                return Err(RuntimeError::PlatformUnsupported {
                    runtime: "bash",
                    os: "windows",
                });
            }
            Ok(InterpreterSpec {
                program: "/bin/bash",
                pre_args: &[],
                extension: ".sh",
                executable: true,
            })
        }
        ScriptType::Powershell => Ok(InterpreterSpec {
            program: if cfg!(windows) { "powershell.exe" } else { "pwsh" },
            pre_args: &["-ExecutionPolicy", "Bypass", "-File"],
            extension: ".ps1",
            executable: false,
        }),
        ScriptType::Lua => Ok(InterpreterSpec {
            program: "lua",
            pre_args: &[],
            extension: ".lua",
            executable: false,
        }),
        ScriptType::Ruby => Ok(InterpreterSpec {
            program: "ruby",
            pre_args: &[],
            extension: ".rb",
            executable: false,
        }),
    }
}

/// Stage `script_content` and run it under the interpreter for
/// `script_type` with the fixed 300-second budget.
///
/// The staged artifact is removed on every exit path. Concurrency-safe
/// across distinct (task, execution) pairs.
pub async fn run_script(
    script_type: ScriptType,
    script_content: &str,
    task_id: &str,
    execution_id: &str,
) -> Result<ScriptOutput> {
    run_script_with_timeout(
        script_type,
        script_content,
        task_id,
        execution_id,
        Duration::from_secs(SCRIPT_TIMEOUT_SECS),
    )
    .await
}

/// Same as [`run_script`] with an explicit budget. Exposed for tests;
/// production callers always use the fixed timeout.
pub async fn run_script_with_timeout(
    script_type: ScriptType,
    script_content: &str,
    task_id: &str,
    execution_id: &str,
    timeout: Duration,
) -> Result<ScriptOutput> {
    let spec = interpreter_for(script_type)?;
    let staged = stage_script(
        script_content,
        spec.extension,
        task_id,
        execution_id,
        spec.executable,
    )?;

    // `staged` stays alive across the await, so the artifact survives for
    // the child's whole lifetime and is removed when this frame unwinds.
    run_command(spec.program, &[staged.path()], spec.pre_args, timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bash_script_runs() {
        let out = run_script_with_timeout(
            ScriptType::Bash,
            "echo from-bash",
            "task",
            "exec",
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.trim(), "from-bash");
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_output_not_an_error() {
        let out = run_script_with_timeout(
            ScriptType::Bash,
            "exit 7",
            "task",
            "exec",
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        assert_eq!(out.exit_code, 7);
    }

    #[cfg(windows)]
    #[tokio::test]
    async fn bash_is_unsupported_on_windows() {
        let err = run_script(ScriptType::Bash, "true", "task", "exec")
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::PlatformUnsupported { .. }));
    }
}
