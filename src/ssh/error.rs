// ABOUTME: SSH-specific error types.
// ABOUTME: Failures talking to the target over SSH, from handshake to a running command.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("ssh session: {0}")]
    Connection(String),

    #[error("target rejected every credential offered for user {0}")]
    AuthenticationFailed(String),

    #[error("host key for {0} is not in known_hosts (add it, or set trust_first_connection: true)")]
    UntrustedHost(String),

    #[error("no usable SSH agent: {0}")]
    AgentUnavailable(String),

    #[error("cannot load identity {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("remote command could not be started: {0}")]
    CommandFailed(String),

    #[error("remote command still running after {0:?}")]
    CommandTimeout(Duration),

    #[error("remote command channel closed before reporting an exit status")]
    ChannelClosed,

    #[error(transparent)]
    Protocol(#[from] russh::Error),

    #[error("SSH key: {0}")]
    Key(#[from] russh::keys::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
