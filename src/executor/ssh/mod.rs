//! remote command execution over ssh
//!
//! an attempt establishes the connection under the connection
//! deadline, authenticates, then runs the configured command in a
//! fresh session raced against the command deadline; the presented
//! host key is checked against the configured known hosts file, or
//! accepted unconditionally when none is configured

mod host_key;

use std::{borrow::Cow, sync::Arc};

use russh::{
    client::{self, AuthResult},
    keys::{load_secret_key, ssh_key::Algorithm, PrivateKey, PrivateKeyWithHashAlg},
    ChannelMsg, Disconnect, Preferred,
};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info};

use self::host_key::HostKeyVerifier;
use super::{ExecError, ExecutionOutcome};
use crate::{action::ActionSpec, metrics};

/// port used when the configured ssh host carries none
const DEFAULT_SSH_PORT: u16 = 22;

/// errors from establishing the ssh transport
#[derive(Debug, Error)]
pub enum SshError {
    #[error(transparent)]
    Transport(#[from] russh::Error),

    /// the connection deadline elapsed before the handshake finished
    #[error("connection attempt timed out")]
    ConnectTimeout,

    /// the known hosts file could not be read or parsed
    #[error("error reading known hosts file: {0}")]
    KnownHosts(#[source] russh::keys::Error),

    /// the presented host key has no matching known hosts entry
    #[error("host key for {0} rejected")]
    HostKeyRejected(String),
}

/// Runs the configured ssh command of `spec` on `spec.ssh_host`,
/// capturing stdout and stderr. Every non success outcome counts once
/// towards `errors_total{type="ssh"}`.
pub async fn run(spec: &ActionSpec) -> ExecutionOutcome {
    info!("running ssh command");

    match attempt(spec).await {
        Ok((stdout, stderr)) => {
            info!(out = stdout.as_str(), err = stderr.as_str(), "ssh command completed");
            ExecutionOutcome::success(stdout, stderr)
        }
        Err(err) => {
            error!("{err}");
            metrics::record_command_error("ssh");
            match err {
                ExecError::Timeout { after } => ExecutionOutcome::timeout(after),
                err => ExecutionOutcome::failure(err),
            }
        }
    }
}

/// one bounded attempt, from authentication setup to command exit
async fn attempt(spec: &ActionSpec) -> Result<(String, String), ExecError> {
    let auth = auth_method(spec)?;
    let config = Arc::new(client_config(spec)?);
    let (host, port) = split_host_port(&spec.ssh_host);
    let verifier = HostKeyVerifier::new(&spec.ssh_known_hosts, host, port);

    let connect = client::connect(config, (host, port), verifier);
    let mut handle = match timeout(spec.ssh_connection_timeout, connect).await {
        Ok(Ok(handle)) => handle,
        Ok(Err(source)) => {
            return Err(ExecError::Dial { host: spec.ssh_host.clone(), source });
        }
        Err(_) => {
            return Err(ExecError::Dial {
                host: spec.ssh_host.clone(),
                source: SshError::ConnectTimeout,
            });
        }
    };

    let result = run_session(&mut handle, spec, auth).await;

    // the connection is closed exactly once on every path; a timed
    // out command keeps running remotely, only its session is
    // abandoned
    let _ = handle
        .disconnect(Disconnect::ByApplication, "", "English")
        .await;

    result
}

/// authentication method derived from the action configuration, the
/// key file takes precedence over the password
enum AuthMethod {
    PublicKey(PrivateKey),
    Password(String),
    None,
}

/// Selects and prepares the authentication method. A key file that
/// can't be read or parsed fails the attempt before any connection is
/// made.
fn auth_method(spec: &ActionSpec) -> Result<AuthMethod, ExecError> {
    if !spec.ssh_key.is_empty() {
        let key = load_secret_key(&spec.ssh_key, None).map_err(ExecError::AuthSetup)?;
        Ok(AuthMethod::PublicKey(key))
    } else if !spec.ssh_password.is_empty() {
        Ok(AuthMethod::Password(spec.ssh_password.clone()))
    } else {
        // the server will reject this at the transport layer, which
        // surfaces as an ordinary failed attempt
        Ok(AuthMethod::None)
    }
}

/// client configuration carrying the configured host key algorithms,
/// an empty list keeps the library default
fn client_config(spec: &ActionSpec) -> Result<client::Config, ExecError> {
    let mut config = client::Config::default();

    if !spec.ssh_host_key_algorithms.is_empty() {
        let algorithms = spec
            .ssh_host_key_algorithms
            .iter()
            .map(|name| {
                Algorithm::new(name).map_err(|source| ExecError::HostKeyAlgorithm {
                    name: name.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        config.preferred = Preferred {
            key: Cow::Owned(algorithms),
            ..Preferred::DEFAULT
        };
    }

    Ok(config)
}

/// splits `host[:port]`, a missing or malformed port falls back to 22
fn split_host_port(host: &str) -> (&str, u16) {
    match host.rsplit_once(':') {
        Some((name, port)) => match port.parse() {
            Ok(port) => (name, port),
            Err(_) => (host, DEFAULT_SSH_PORT),
        },
        None => (host, DEFAULT_SSH_PORT),
    }
}

/// authenticates and runs the command raced against the command
/// deadline; when the timer wins the session future is dropped and
/// whatever the abandoned session produces afterwards is discarded
/// with it, never merged into the returned outcome
async fn run_session(
    handle: &mut client::Handle<HostKeyVerifier>,
    spec: &ActionSpec,
    auth: AuthMethod,
) -> Result<(String, String), ExecError> {
    authenticate(handle, spec, auth).await?;

    match timeout(spec.ssh_command_timeout, exec_command(handle, &spec.ssh_command)).await {
        Ok(result) => result,
        Err(_) => Err(ExecError::Timeout { after: spec.ssh_command_timeout }),
    }
}

async fn authenticate(
    handle: &mut client::Handle<HostKeyVerifier>,
    spec: &ActionSpec,
    auth: AuthMethod,
) -> Result<(), ExecError> {
    let transport_err = |source: russh::Error| ExecError::Dial {
        host: spec.ssh_host.clone(),
        source: source.into(),
    };

    let result = match auth {
        AuthMethod::PublicKey(key) => {
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(transport_err)?
                .flatten();
            handle
                .authenticate_publickey(
                    &spec.user,
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await
        }
        AuthMethod::Password(password) => {
            handle.authenticate_password(&spec.user, password).await
        }
        AuthMethod::None => handle.authenticate_none(&spec.user).await,
    }
    .map_err(transport_err)?;

    if !matches!(result, AuthResult::Success) {
        return Err(ExecError::AuthRejected {
            user: spec.user.clone(),
            host: spec.ssh_host.clone(),
        });
    }

    Ok(())
}

/// opens a session, runs `command` and collects its output streams
/// until the channel closes
async fn exec_command(
    handle: &mut client::Handle<HostKeyVerifier>,
    command: &str,
) -> Result<(String, String), ExecError> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(ExecError::Session)?;

    channel.exec(true, command).await.map_err(ExecError::Command)?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_status = None;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
            // extended data stream 1 carries stderr
            ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
            ChannelMsg::ExitStatus { exit_status: status } => exit_status = Some(status),
            _ => {}
        }
    }

    let stdout = String::from_utf8_lossy(&stdout).into_owned();
    let stderr = String::from_utf8_lossy(&stderr).into_owned();

    match exit_status {
        Some(0) => Ok((stdout, stderr)),
        Some(status) => Err(ExecError::RemoteExit(status)),
        None => Err(ExecError::MissingExitStatus),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{run, split_host_port};
    use crate::{
        action::{tests::alert_with_annotations, ActionSpec},
        executor::{ExecError, ExecutionStatus},
        metrics,
        settings::ResponderDefaults,
    };

    fn spec_for_host(host: &str) -> ActionSpec {
        let defaults = ResponderDefaults {
            user: "responder".to_string(),
            ssh_password: "hunter2".to_string(),
            ssh_connection_timeout: Duration::from_secs(5),
            ssh_command_timeout: Duration::from_secs(5),
            ..ResponderDefaults::default()
        };
        let alert = alert_with_annotations(serde_json::json!({
            "command_responder_ssh_host": host,
            "command_responder_ssh_command": "true",
        }));

        ActionSpec::resolve(&defaults, &alert)
    }

    #[test]
    fn host_port_splitting() {
        assert_eq!(split_host_port("node1:2222"), ("node1", 2222));
        assert_eq!(split_host_port("node1"), ("node1", 22));
        assert_eq!(split_host_port("127.0.0.1:22"), ("127.0.0.1", 22));
    }

    #[tokio::test]
    async fn failed_attempts_increment_error_counter_once() {
        let _guard = metrics::counter_test_lock();

        // unreadable key file fails before any connection is made
        let before = metrics::command_errors("ssh");
        let mut spec = spec_for_host("127.0.0.1:1");
        spec.ssh_key = "/nonexistent/ssh/key".to_string();

        let outcome = run(&spec).await;
        assert!(matches!(
            outcome.status,
            ExecutionStatus::Failure(ExecError::AuthSetup(_))
        ));
        assert_eq!(metrics::command_errors("ssh"), before + 1);

        // nothing listens on port 1, the dial fails well before the
        // connection deadline
        let outcome = run(&spec_for_host("127.0.0.1:1")).await;
        assert!(matches!(
            outcome.status,
            ExecutionStatus::Failure(ExecError::Dial { .. })
        ));
        assert_eq!(metrics::command_errors("ssh"), before + 2);
    }

    #[tokio::test]
    async fn unknown_host_key_algorithm_fails_the_attempt() {
        let _guard = metrics::counter_test_lock();

        let mut spec = spec_for_host("127.0.0.1:1");
        spec.ssh_host_key_algorithms = vec!["no-such-algorithm".to_string()];

        let outcome = run(&spec).await;
        assert!(matches!(
            outcome.status,
            ExecutionStatus::Failure(ExecError::HostKeyAlgorithm { .. })
        ));
    }
}
