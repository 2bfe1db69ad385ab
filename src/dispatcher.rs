//! decides which action paths run for an alert and reports their
//! outcomes

use tokio::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};

use crate::{
    action::ActionSpec,
    alert::Alert,
    executor::{self, ExecError},
    settings::ResponderDefaults,
};

/// Resolves the action configuration of `alert` and runs the
/// configured action paths in sequence, the local command first. A
/// failing path never prevents the other one from being attempted;
/// the last encountered error is returned to the caller.
pub async fn handle_alert(
    defaults: &ResponderDefaults,
    alert: &Alert,
) -> Result<(), ExecError> {
    let span = info_span!(
        "alert",
        fingerprint = alert.fingerprint.as_str(),
        alertname = alert.name()
    );

    async move {
        debug!("handling alert");

        let spec = ActionSpec::resolve(defaults, alert);
        let mut last_error = None;

        if !spec.local_command.is_empty() {
            let span = info_span!("local", command = spec.local_command.as_str());
            let start = Instant::now();

            let outcome = executor::local::run(&spec.local_command, spec.local_command_timeout)
                .instrument(span.clone())
                .await;

            let _entered = span.enter();
            info!(duration = start.elapsed().as_secs_f64(), "command completed");
            if let Some(err) = outcome.into_error() {
                error!("failed to run local command: {err}");
                last_error = Some(err);
            }
        }

        if !spec.ssh_command.is_empty() {
            let span = info_span!(
                "ssh",
                user = spec.user.as_str(),
                ssh_host = spec.ssh_host.as_str(),
                command = spec.ssh_command.as_str()
            );
            let start = Instant::now();

            let outcome = executor::ssh::run(&spec).instrument(span.clone()).await;

            let _entered = span.enter();
            info!(duration = start.elapsed().as_secs_f64(), "command completed");
            if let Some(err) = outcome.into_error() {
                error!("failed to run ssh command: {err}");
                last_error = Some(err);
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::handle_alert;
    use crate::{
        action::tests::alert_with_annotations,
        executor::ExecError,
        metrics,
        settings::ResponderDefaults,
    };

    fn defaults() -> ResponderDefaults {
        ResponderDefaults {
            user: "responder".to_string(),
            ssh_password: "hunter2".to_string(),
            ssh_connection_timeout: Duration::from_secs(5),
            ssh_command_timeout: Duration::from_secs(5),
            ..ResponderDefaults::default()
        }
    }

    #[tokio::test]
    async fn no_configured_command_runs_nothing() {
        let _guard = metrics::counter_test_lock();

        let local_before = metrics::command_errors("local");
        let ssh_before = metrics::command_errors("ssh");

        let alert = alert_with_annotations(json!({}));
        let result = handle_alert(&defaults(), &alert).await;

        assert!(result.is_ok());
        assert_eq!(metrics::command_errors("local"), local_before);
        assert_eq!(metrics::command_errors("ssh"), ssh_before);
    }

    #[tokio::test]
    async fn local_command_dispatch_succeeds() {
        let _guard = metrics::counter_test_lock();

        let local_before = metrics::command_errors("local");

        let alert = alert_with_annotations(json!({
            "command_responder_local_command": "echo hi",
        }));
        let result = handle_alert(&defaults(), &alert).await;

        assert!(result.is_ok());
        assert_eq!(metrics::command_errors("local"), local_before);
    }

    #[tokio::test]
    async fn failing_local_path_does_not_prevent_ssh_path() {
        let _guard = metrics::counter_test_lock();

        let ssh_before = metrics::command_errors("ssh");

        // the local command fails, the ssh path must still be
        // attempted and its dial error is the one returned
        let alert = alert_with_annotations(json!({
            "command_responder_local_command": "exit 1",
            "command_responder_ssh_host": "127.0.0.1:1",
            "command_responder_ssh_command": "true",
        }));
        let result = handle_alert(&defaults(), &alert).await;

        assert!(matches!(result, Err(ExecError::Dial { .. })));
        assert_eq!(metrics::command_errors("ssh"), ssh_before + 1);
    }

    #[tokio::test]
    async fn ssh_dial_failure_is_returned() {
        let _guard = metrics::counter_test_lock();

        // a one second command deadline must not matter, the dial
        // fails first
        let alert = alert_with_annotations(json!({
            "command_responder_ssh_host": "127.0.0.1:1",
            "command_responder_ssh_command": "true",
            "command_responder_ssh_command_timeout": "1s",
        }));
        let result = handle_alert(&defaults(), &alert).await;

        assert!(matches!(result, Err(ExecError::Dial { .. })));
    }
}
