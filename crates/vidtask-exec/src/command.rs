//! One-shot command execution.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use vidtask_models::ExecutionResult;

use crate::error::{ExecError, ExecResult};

/// Run an external command to completion.
///
/// Returns an [`ExecutionResult`] for any command that actually ran,
/// including non-zero exits (`success == false`). Errors are reserved
/// for conditions where no command outcome exists: empty argv, missing
/// executable, spawn failure, or a timeout kill.
pub async fn run_command(argv: &[String]) -> ExecResult<ExecutionResult> {
    run_command_with_timeout(argv, None).await
}

/// Run an external command with an optional timeout.
///
/// On timeout the child is killed and reaped; the child is spawned with
/// kill-on-drop so a cancelled caller cannot leak the process either.
pub async fn run_command_with_timeout(
    argv: &[String],
    timeout: Option<Duration>,
) -> ExecResult<ExecutionResult> {
    let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;

    // Resolve up front so a missing executable is reported distinctly
    // from a command that ran and failed.
    which::which(program).map_err(|_| ExecError::NotFound(program.clone()))?;

    debug!("Running command: {}", argv.join(" "));

    let start = Instant::now();

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = if let Some(timeout) = timeout {
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                // The child handle was consumed by wait_with_output;
                // kill-on-drop reaps the process when the future drops.
                warn!(
                    "Command '{}' timed out after {}s, killing process",
                    program,
                    timeout.as_secs()
                );
                return Err(ExecError::Timeout(timeout.as_secs()));
            }
        }
    } else {
        child.wait_with_output().await?
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let exit_code = output.status.code();
    let success = output.status.success();

    if !success {
        debug!(
            "Command '{}' exited with code {:?} after {}ms",
            program, exit_code, duration_ms
        );
    }

    Ok(ExecutionResult {
        success,
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        command: argv.to_vec(),
        duration_ms,
        error: if success {
            None
        } else {
            Some(format!("Command exited with code {:?}", exit_code))
        },
        task_info: Default::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn successful_command_captures_stdout() {
        let result = run_command(&argv(&["echo", "hello"])).await.unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_result_not_an_error() {
        let result = run_command(&argv(&["sh", "-c", "echo oops >&2; exit 3"]))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr.trim(), "oops");
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn missing_executable_is_distinguished() {
        let err = run_command(&argv(&["definitely-not-a-real-binary-42"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        let err = run_command(&[]).await.unwrap_err();
        assert!(matches!(err, ExecError::EmptyCommand));
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let start = Instant::now();
        let err = run_command_with_timeout(&argv(&["sleep", "30"]), Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Timeout(_)));
        assert!(err.is_retryable());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
