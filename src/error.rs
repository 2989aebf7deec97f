// ABOUTME: Application-wide error types for deckhand.
// ABOUTME: Uses thiserror and maps every failure class to a process exit code.

use std::path::PathBuf;
use thiserror::Error;

use crate::deploy::DeployError;
use crate::exec::{ExecError, ExecErrorKind};
use crate::health::Verdict;
use crate::patch::PatchError;
use crate::services::ServiceError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const INTERNAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const CONNECTION: i32 = 3;
    pub const DIRTY_TREE: i32 = 4;
    pub const SYNC: i32 = 5;
    pub const BUILD: i32 = 6;
    pub const SERVICE: i32 = 7;
    pub const PATCH: i32 = 8;
    pub const HEALTH: i32 = 9;
    pub const LOCK_HELD: i32 = 10;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("health verdict is {0}")]
    Unhealthy(Verdict),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::AlreadyExists(_)
            | Error::ConfigNotFound(_)
            | Error::UnknownDestination(_)
            | Error::MissingEnvVar(_)
            | Error::InvalidConfig(_)
            | Error::Yaml(_) => exit_code::CONFIG,
            Error::Io(_) => exit_code::INTERNAL,
            Error::Exec(e) => match e.kind() {
                ExecErrorKind::Connection => exit_code::CONNECTION,
                ExecErrorKind::Command => exit_code::INTERNAL,
            },
            Error::Deploy(e) => e.exit_code(),
            Error::Patch(_) => exit_code::PATCH,
            Error::Service(e) => match e.source_exec().map(ExecError::kind) {
                Some(ExecErrorKind::Connection) => exit_code::CONNECTION,
                _ => exit_code::SERVICE,
            },
            Error::Unhealthy(_) => exit_code::HEALTH,
        }
    }

    /// Output tail worth showing under the error message.
    pub fn tail(&self) -> Option<&str> {
        match self {
            Error::Exec(e) => e.tail(),
            Error::Deploy(e) => e.tail(),
            Error::Patch(e) => e.tail(),
            Error::Service(e) => e.tail(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_problems_exit_with_2() {
        assert_eq!(Error::ConfigNotFound(PathBuf::from("/tmp")).exit_code(), 2);
        assert_eq!(Error::MissingEnvVar("DB_PASSWORD".to_string()).exit_code(), 2);
    }

    #[test]
    fn lock_and_interrupt_codes() {
        assert_eq!(Error::Deploy(DeployError::Interrupted).exit_code(), 130);
        assert_eq!(Error::Deploy(DeployError::lock_error("held")).exit_code(), 10);
    }

    #[test]
    fn unhealthy_exits_with_9() {
        assert_eq!(Error::Unhealthy(Verdict::Failed).exit_code(), 9);
    }
}
