//! per alert action configuration, merged from the process wide
//! defaults and the alert's annotation overrides

use std::time::Duration;

use tracing::error;

use crate::{alert::Alert, settings::ResponderDefaults};

/// annotation overriding the login user of the ssh action path
const USER_ANNOTATION: &str = "command_responder_user";
/// annotation overriding the ssh private key path
const SSH_KEY_ANNOTATION: &str = "command_responder_ssh_key";
/// annotation naming the remote host to run the ssh command on
const SSH_HOST_ANNOTATION: &str = "command_responder_ssh_host";
/// annotation naming the command to run over ssh
const SSH_COMMAND_ANNOTATION: &str = "command_responder_ssh_command";
/// annotation overriding the ssh command deadline
const SSH_COMMAND_TIMEOUT_ANNOTATION: &str = "command_responder_ssh_command_timeout";
/// annotation naming the command to run on the local host
const LOCAL_COMMAND_ANNOTATION: &str = "command_responder_local_command";
/// annotation overriding the local command deadline
const LOCAL_COMMAND_TIMEOUT_ANNOTATION: &str = "command_responder_local_command_timeout";

/// resolved action configuration of one alert
///
/// every field is either the process wide default or an annotation
/// override; the password, known hosts path and host key algorithms
/// can't be overridden per alert. empty `local_command` and empty
/// `ssh_command` means there is nothing to run. derived fresh for
/// every alert and discarded after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub user: String,
    pub ssh_key: String,
    pub ssh_password: String,
    pub ssh_known_hosts: String,
    pub ssh_host_key_algorithms: Vec<String>,
    pub ssh_connection_timeout: Duration,
    pub ssh_command_timeout: Duration,
    pub ssh_host: String,
    pub ssh_command: String,
    pub local_command: String,
    pub local_command_timeout: Duration,
}

impl ActionSpec {
    /// merge `defaults` with the annotation overrides of `alert`
    ///
    /// a duration annotation that fails to parse keeps the default
    /// value, this is recoverable and never aborts dispatch
    pub fn resolve(defaults: &ResponderDefaults, alert: &Alert) -> Self {
        let mut spec = Self {
            user: defaults.user.clone(),
            ssh_key: defaults.ssh_key.clone(),
            ssh_password: defaults.ssh_password.clone(),
            ssh_known_hosts: defaults.ssh_known_hosts.clone(),
            ssh_host_key_algorithms: defaults.ssh_host_key_algorithms.clone(),
            ssh_connection_timeout: defaults.ssh_connection_timeout,
            ssh_command_timeout: defaults.ssh_command_timeout,
            ssh_host: String::new(),
            ssh_command: String::new(),
            local_command: String::new(),
            local_command_timeout: defaults.local_command_timeout,
        };

        let annotations = &alert.annotations;

        if let Some(val) = annotations.get(USER_ANNOTATION) {
            spec.user = val.clone();
        }
        if let Some(val) = annotations.get(SSH_KEY_ANNOTATION) {
            spec.ssh_key = val.clone();
        }
        if let Some(val) = annotations.get(SSH_HOST_ANNOTATION) {
            spec.ssh_host = val.clone();
        }
        if let Some(val) = annotations.get(SSH_COMMAND_ANNOTATION) {
            spec.ssh_command = val.clone();
        }
        if let Some(val) = annotations.get(SSH_COMMAND_TIMEOUT_ANNOTATION) {
            match humantime::parse_duration(val) {
                Ok(timeout) => spec.ssh_command_timeout = timeout,
                Err(err) => {
                    error!(timeout = val.as_str(), "unable to parse ssh command timeout: {err}");
                }
            }
        }
        if let Some(val) = annotations.get(LOCAL_COMMAND_ANNOTATION) {
            spec.local_command = val.clone();
        }
        if let Some(val) = annotations.get(LOCAL_COMMAND_TIMEOUT_ANNOTATION) {
            match humantime::parse_duration(val) {
                Ok(timeout) => spec.local_command_timeout = timeout,
                Err(err) => {
                    error!(timeout = val.as_str(), "unable to parse local command timeout: {err}");
                }
            }
        }

        spec
    }
}
