//! the two action execution strategies and their shared outcome type

pub mod local;
pub mod ssh;

use std::time::Duration;

use thiserror::Error;

use self::ssh::SshError;

/// terminal status of one executor invocation
#[derive(Debug)]
pub enum ExecutionStatus {
    /// the command finished within its deadline and exited cleanly
    Success,
    /// the deadline elapsed before the command finished
    Timeout {
        /// the deadline that elapsed
        after: Duration,
    },
    /// the command could not be run or exited unsuccessfully
    Failure(ExecError),
}

/// captured output and terminal status of one executor invocation,
/// consumed immediately by the dispatcher, never persisted
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub status: ExecutionStatus,
}

impl ExecutionOutcome {
    pub(crate) fn success(stdout: String, stderr: String) -> Self {
        Self { stdout, stderr, status: ExecutionStatus::Success }
    }

    pub(crate) fn timeout(after: Duration) -> Self {
        Self { stdout: String::new(), stderr: String::new(), status: ExecutionStatus::Timeout { after } }
    }

    pub(crate) fn failure(error: ExecError) -> Self {
        Self { stdout: String::new(), stderr: String::new(), status: ExecutionStatus::Failure(error) }
    }

    /// the declared error of this outcome, [None] on success
    pub fn into_error(self) -> Option<ExecError> {
        match self.status {
            ExecutionStatus::Success => None,
            ExecutionStatus::Timeout { after } => Some(ExecError::Timeout { after }),
            ExecutionStatus::Failure(error) => Some(error),
        }
    }
}

/// errors terminal to a single executor invocation, they are logged
/// and counted but never abort the other action path or later alerts
#[derive(Debug, Error)]
pub enum ExecError {
    /// the configured private key file could not be read or parsed,
    /// no connection is attempted in this case
    #[error("failed to set up ssh public key authentication: {0}")]
    AuthSetup(#[source] russh::keys::Error),

    /// a configured host key algorithm name is unknown
    #[error("invalid ssh host key algorithm {name:?}: {source}")]
    HostKeyAlgorithm {
        name: String,
        #[source]
        source: russh::keys::ssh_key::Error,
    },

    /// the ssh connection could not be established, this covers
    /// refused or unreachable hosts, handshake failures, rejected
    /// host keys and the connection deadline
    #[error("failed to establish ssh connection to {host}: {source}")]
    Dial {
        host: String,
        #[source]
        source: SshError,
    },

    /// the server rejected the offered authentication method
    #[error("ssh authentication as {user} rejected by {host}")]
    AuthRejected { user: String, host: String },

    /// the remote session could not be created
    #[error("failed to establish ssh session: {0}")]
    Session(#[source] russh::Error),

    /// transport error while running the remote command
    #[error("failed to run ssh command: {0}")]
    Command(#[source] russh::Error),

    /// the remote command exited with a non zero status
    #[error("remote command exited with status {0}")]
    RemoteExit(u32),

    /// the remote side closed the channel without reporting an exit
    /// status
    #[error("remote command exited without exit status")]
    MissingExitStatus,

    /// the local command could not be spawned
    #[error("failed to launch local command: {0}")]
    Launch(#[source] std::io::Error),

    /// the local command exited with a non zero status
    #[error("local command exited with {0}")]
    Exit(std::process::ExitStatus),

    /// the deadline elapsed before the command finished
    #[error("command timed out after {after:?}")]
    Timeout { after: Duration },
}
