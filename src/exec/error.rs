// ABOUTME: Executor error types with SNAFU context selectors.
// ABOUTME: Separates unreachable targets from commands that ran and failed.

use snafu::Snafu;
use std::time::Duration;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ExecError {
    #[snafu(display("cannot reach {target}: {source}"))]
    Connection {
        target: String,
        source: crate::ssh::Error,
    },

    #[snafu(display("failed to spawn `{command}`: {source}"))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("`{command}` timed out after {timeout:?}"))]
    Timeout { command: String, timeout: Duration },

    #[snafu(display("`{command}` exited with status {exit_code}"))]
    Command {
        command: String,
        exit_code: i32,
        tail: String,
    },

    #[snafu(display("remote execution of `{command}` failed: {source}"))]
    Remote {
        command: String,
        source: crate::ssh::Error,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    /// Host unreachable, authentication failed, or the session dropped.
    Connection,
    /// The command ran (or tried to) and did not succeed.
    Command,
}

impl ExecError {
    pub fn kind(&self) -> ExecErrorKind {
        match self {
            ExecError::Connection { .. } => ExecErrorKind::Connection,
            ExecError::Remote { source, .. } => match source {
                crate::ssh::Error::CommandTimeout(_) => ExecErrorKind::Command,
                _ => ExecErrorKind::Connection,
            },
            ExecError::Spawn { .. } | ExecError::Timeout { .. } | ExecError::Command { .. } => {
                ExecErrorKind::Command
            }
        }
    }

    /// Captured output tail, when the command produced any.
    pub fn tail(&self) -> Option<&str> {
        match self {
            ExecError::Command { tail, .. } if !tail.is_empty() => Some(tail),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::Command { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
