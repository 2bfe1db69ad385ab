//! host key verification strategies of the ssh executor
//!
//! the policy is a closed set of two strategies selected by
//! configuration: verification against a known hosts file, or
//! accepting any presented key when no file is configured. the
//! latter is insecure by default on purpose, an opt in for trusted
//! internal networks, and must not be silently tightened.

use russh::{
    client,
    keys::{known_hosts::check_known_hosts_path, Error as KeysError, PublicKey, PublicKeyBase64},
};
use tracing::{debug, error};

use super::SshError;

/// how a host key presented during the handshake is judged
#[derive(Debug, Clone)]
enum HostKeyPolicy {
    /// accept any key the remote host presents
    AcceptAll,
    /// accept only keys matching an entry of the known hosts file
    KnownHosts(String),
}

impl HostKeyPolicy {
    fn from_path(known_hosts: &str) -> Self {
        if known_hosts.is_empty() {
            Self::AcceptAll
        } else {
            Self::KnownHosts(known_hosts.to_string())
        }
    }
}

/// russh client handler carrying the host key policy of one attempt
pub(super) struct HostKeyVerifier {
    policy: HostKeyPolicy,
    host: String,
    port: u16,
}

impl HostKeyVerifier {
    pub(super) fn new(known_hosts: &str, host: &str, port: u16) -> Self {
        Self {
            policy: HostKeyPolicy::from_path(known_hosts),
            host: host.to_string(),
            port,
        }
    }
}

impl client::Handler for HostKeyVerifier {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            hostname = self.host.as_str(),
            port = self.port,
            key = server_public_key.public_key_base64().as_str(),
            "verifying ssh host key"
        );

        match &self.policy {
            HostKeyPolicy::AcceptAll => Ok(true),
            HostKeyPolicy::KnownHosts(path) => {
                match check_known_hosts_path(&self.host, self.port, server_public_key, path) {
                    Ok(true) => Ok(true),
                    Ok(false) => Err(SshError::HostKeyRejected(self.host.clone())),
                    Err(err @ KeysError::KeyChanged { .. }) => {
                        error!("host key for {} changed: {err}", self.host);
                        Err(SshError::HostKeyRejected(self.host.clone()))
                    }
                    // unreadable or malformed known hosts file, the
                    // connection attempt aborts during the handshake
                    Err(err) => Err(SshError::KnownHosts(err)),
                }
            }
        }
    }
}
