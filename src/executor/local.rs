//! local command execution under a hard deadline

use std::{process::Stdio, time::Duration};

use tokio::{process::Command, time::timeout};
use tracing::{error, info};

use super::{ExecError, ExecutionOutcome, ExecutionStatus};
use crate::metrics;

/// shell the configured command line is handed to
#[cfg(not(windows))]
const SHELL: (&str, &str) = ("sh", "-c");
#[cfg(windows)]
const SHELL: (&str, &str) = ("cmd", "/C");

/// Runs `command` through the platform shell with the inherited
/// process environment, capturing stdout and stderr. `deadline`
/// bounds the whole invocation; a process still running when it
/// elapses is signalled to terminate without awaiting its exit, and
/// the outcome is reported as timeout. Every non success outcome
/// counts once towards `errors_total{type="local"}`.
pub async fn run(command: &str, deadline: Duration) -> ExecutionOutcome {
    info!("running local command");

    let (shell, flag) = SHELL;
    let mut cmd = Command::new(shell);
    cmd.arg(flag)
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(deadline, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            error!("error executing command: {err}");
            metrics::record_command_error("local");
            return ExecutionOutcome::failure(ExecError::Launch(err));
        }
        Err(_) => {
            // dropping the output future kills the child, its exit is
            // not awaited
            error!("local command timed out");
            metrics::record_command_error("local");
            return ExecutionOutcome::timeout(deadline);
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        error!("local command exited with {}", output.status);
        metrics::record_command_error("local");
        return ExecutionOutcome {
            stdout,
            stderr,
            status: ExecutionStatus::Failure(ExecError::Exit(output.status)),
        };
    }

    info!(out = stdout.as_str(), err = stderr.as_str(), "local command completed");
    ExecutionOutcome::success(stdout, stderr)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::run;
    use crate::{
        executor::{ExecError, ExecutionStatus},
        metrics,
    };

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let outcome = run("echo hi; echo oops >&2", Duration::from_secs(30)).await;

        assert!(matches!(outcome.status, ExecutionStatus::Success));
        assert!(outcome.stdout.contains("hi"));
        assert!(outcome.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn error_counter_increments_once_per_non_success() {
        let _guard = metrics::counter_test_lock();

        let before = metrics::command_errors("local");
        let outcome = run("true", Duration::from_secs(30)).await;
        assert!(matches!(outcome.status, ExecutionStatus::Success));
        assert_eq!(metrics::command_errors("local"), before);

        let outcome = run("exit 3", Duration::from_secs(30)).await;
        assert!(matches!(
            outcome.status,
            ExecutionStatus::Failure(ExecError::Exit(_))
        ));
        assert_eq!(metrics::command_errors("local"), before + 1);

        let outcome = run("sleep 5", Duration::from_millis(100)).await;
        assert!(matches!(outcome.status, ExecutionStatus::Timeout { .. }));
        assert_eq!(metrics::command_errors("local"), before + 2);
    }

    #[tokio::test]
    async fn timeout_is_not_reported_for_fast_commands() {
        let outcome = run("echo done", Duration::from_secs(30)).await;

        assert!(matches!(outcome.status, ExecutionStatus::Success));
        assert!(outcome.into_error().is_none());
    }
}
