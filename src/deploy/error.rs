// ABOUTME: Error types for deployment runs.
// ABOUTME: Classifies failures for exit codes and attaches remediation hints.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::steps::StepOrderError;
use crate::build::BuildError;
use crate::compose::ComposeCli;
use crate::error::exit_code;
use crate::exec::{ExecError, ExecErrorKind};
use crate::patch::PatchError;
use crate::services::ServiceError;
use crate::sync::SyncError;

/// Errors that abort a deployment run.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("deploy of {project} is locked by {} since {}", .holder, .started_at.format("%Y-%m-%d %H:%M:%S UTC"))]
    LockHeld {
        project: String,
        holder: LockHolderInfo,
        started_at: DateTime<Utc>,
    },

    #[error("deploy lock error: {0}")]
    Lock(String),

    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    StepOrder(#[from] StepOrderError),
}

/// Who holds a lock, for error messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockHolderInfo {
    pub host: String,
    pub pid: u32,
}

impl std::fmt::Display for LockHolderInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (pid {})", self.host, self.pid)
    }
}

/// Error kind for exit codes and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployErrorKind {
    Connection,
    DirtyTree,
    Sync,
    Build,
    Service,
    Patch,
    LockHeld,
    Interrupted,
    Internal,
}

impl DeployErrorKind {
    pub fn exit_code(self) -> i32 {
        match self {
            DeployErrorKind::Connection => exit_code::CONNECTION,
            DeployErrorKind::DirtyTree => exit_code::DIRTY_TREE,
            DeployErrorKind::Sync => exit_code::SYNC,
            DeployErrorKind::Build => exit_code::BUILD,
            DeployErrorKind::Service => exit_code::SERVICE,
            DeployErrorKind::Patch => exit_code::PATCH,
            DeployErrorKind::LockHeld => exit_code::LOCK_HELD,
            DeployErrorKind::Interrupted => exit_code::INTERRUPTED,
            DeployErrorKind::Internal => exit_code::INTERNAL,
        }
    }
}

fn lost_connection(e: Option<&ExecError>) -> bool {
    e.is_some_and(|e| e.kind() == ExecErrorKind::Connection)
}

impl DeployError {
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::Sync(SyncError::DirtyTree { .. }) => DeployErrorKind::DirtyTree,
            DeployError::Sync(SyncError::Exec(e)) | DeployError::Build(BuildError::Exec(e))
                if lost_connection(Some(e)) =>
            {
                DeployErrorKind::Connection
            }
            DeployError::Sync(_) => DeployErrorKind::Sync,
            DeployError::Build(_) => DeployErrorKind::Build,
            DeployError::Service(e) if lost_connection(e.source_exec()) => {
                DeployErrorKind::Connection
            }
            DeployError::Service(_) => DeployErrorKind::Service,
            DeployError::Patch(_) => DeployErrorKind::Patch,
            DeployError::Exec(e) if lost_connection(Some(e)) => DeployErrorKind::Connection,
            DeployError::Exec(_) => DeployErrorKind::Internal,
            DeployError::LockHeld { .. } | DeployError::Lock(_) => DeployErrorKind::LockHeld,
            DeployError::Interrupted => DeployErrorKind::Interrupted,
            DeployError::StepOrder(_) => DeployErrorKind::Internal,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// Captured output of the failing command.
    pub fn tail(&self) -> Option<&str> {
        match self {
            DeployError::Sync(e) => e.tail(),
            DeployError::Build(e) => e.tail(),
            DeployError::Service(e) => e.tail(),
            DeployError::Patch(e) => e.tail(),
            DeployError::Exec(e) => e.tail(),
            _ => None,
        }
    }

    /// The next command class an operator should try.
    pub fn remediation(&self, compose: &ComposeCli) -> Option<String> {
        match self {
            DeployError::Build(BuildError::StaleLayers { .. } | BuildError::Failed { .. }) => {
                Some("rebuild with cache pruning (`deckhand deploy --mode prune`)".to_string())
            }
            DeployError::Sync(SyncError::DirtyTree { .. }) => Some(
                "commit or discard the changes, or re-run with `--dirty stash` to keep a dated backup"
                    .to_string(),
            ),
            DeployError::Sync(SyncError::Diverged { .. }) => Some(format!(
                "resolve the divergence in {} (the target has local commits)",
                compose.workdir()
            )),
            DeployError::Sync(SyncError::Fetch { .. }) => {
                Some("check network access and credentials for the git remote".to_string())
            }
            DeployError::Service(ServiceError::NotReady { missing, .. }) => Some(format!(
                "inspect `{} logs {}`",
                compose.program(),
                missing.join(" ")
            )),
            DeployError::Patch(_) => Some(
                "preview the patches with `deckhand patch --dry-run`; statements listed as applied are already in effect"
                    .to_string(),
            ),
            DeployError::LockHeld { .. } => Some(
                "wait for the other run to finish, or pass `--force-lock` if it is gone".to_string(),
            ),
            _ if self.kind() == DeployErrorKind::Connection => {
                Some("check that the target is reachable over SSH".to_string())
            }
            _ => None,
        }
    }

    pub fn lock_error(msg: impl Into<String>) -> Self {
        DeployError::Lock(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GitRef, ServiceName};

    fn compose() -> ComposeCli {
        ComposeCli::new("docker compose", "docker-compose.yml", "/opt/app")
    }

    #[test]
    fn dirty_tree_has_its_own_kind() {
        let err = DeployError::from(SyncError::DirtyTree {
            paths: vec!["a.py".to_string()],
        });
        assert_eq!(err.kind(), DeployErrorKind::DirtyTree);
        assert_eq!(err.exit_code(), 4);
        assert!(err.remediation(&compose()).unwrap().contains("--dirty stash"));
    }

    #[test]
    fn stale_layers_suggest_prune() {
        let err = DeployError::from(BuildError::StaleLayers {
            service: ServiceName::new("backend").unwrap(),
            marker: "#4 CACHED".to_string(),
            tail: "#4 CACHED".to_string(),
        });
        assert_eq!(err.exit_code(), 6);
        assert!(err.remediation(&compose()).unwrap().contains("--mode prune"));
        assert_eq!(err.tail(), Some("#4 CACHED"));
    }

    #[test]
    fn diverged_names_workdir() {
        let err = DeployError::from(SyncError::Diverged {
            reference: GitRef::default(),
            tail: "fatal: Not possible to fast-forward".to_string(),
        });
        assert_eq!(err.exit_code(), 5);
        assert!(err.remediation(&compose()).unwrap().contains("/opt/app"));
    }

    #[test]
    fn exec_failures_during_steps_map_to_connection_when_unreachable() {
        let err = DeployError::from(SyncError::Exec(ExecError::Connection {
            target: "deploy@vps:22".to_string(),
            source: crate::ssh::Error::Connection("refused".to_string()),
        }));
        assert_eq!(err.kind(), DeployErrorKind::Connection);
        assert_eq!(err.exit_code(), 3);
    }
}
