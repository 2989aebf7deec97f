// ABOUTME: Source sync: brings the target's checkout to a remote git ref.
// ABOUTME: Dirty trees either fail the run or are stashed as a dated backup.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::exec::{ERROR_TAIL_LINES, ExecError, Executor, ShellCommand, shell_quote};
use crate::types::GitRef;

/// What to do with uncommitted changes in the working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirtyPolicy {
    /// Abort with a dirty-tree error.
    #[default]
    Fail,
    /// `git stash` the changes under a dated label and continue.
    Stash,
}

impl FromStr for DirtyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(DirtyPolicy::Fail),
            "stash" => Ok(DirtyPolicy::Stash),
            other => Err(format!("unknown dirty-tree policy: {}", other)),
        }
    }
}

impl fmt::Display for DirtyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirtyPolicy::Fail => write!(f, "fail"),
            DirtyPolicy::Stash => write!(f, "stash"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{workdir} is not a git checkout: {tail}")]
    NotARepository { workdir: String, tail: String },

    #[error("working tree has {} uncommitted change(s): {}", paths.len(), preview(paths))]
    DirtyTree { paths: Vec<String> },

    #[error("failed to stash local changes: {tail}")]
    Stash { tail: String },

    #[error("failed to fetch {reference} from {remote}: {tail}")]
    Fetch {
        remote: String,
        reference: GitRef,
        tail: String,
    },

    #[error("failed to check out {reference}: {tail}")]
    Checkout { reference: GitRef, tail: String },

    #[error("local history diverged from {reference}; fast-forward refused: {tail}")]
    Diverged { reference: GitRef, tail: String },

    #[error("could not resolve HEAD to a commit: {0}")]
    BadCommit(String),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

fn preview(paths: &[String]) -> String {
    let mut shown: Vec<&str> = paths.iter().take(10).map(String::as_str).collect();
    if paths.len() > 10 {
        shown.push("...");
    }
    shown.join(", ")
}

impl SyncError {
    /// Output tail captured from the failing git command.
    pub fn tail(&self) -> Option<&str> {
        match self {
            SyncError::NotARepository { tail, .. }
            | SyncError::Stash { tail }
            | SyncError::Fetch { tail, .. }
            | SyncError::Checkout { tail, .. }
            | SyncError::Diverged { tail, .. } => Some(tail),
            SyncError::Exec(e) => e.tail(),
            SyncError::DirtyTree { .. } | SyncError::BadCommit(_) => None,
        }
    }
}

/// Result of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Commit the working tree now points at.
    pub commit: String,
    /// Label of the stash holding pre-sync local changes, if any were stashed.
    pub stash: Option<String>,
}

/// Source sync settings for one run.
#[derive(Debug, Clone)]
pub struct SourceSync {
    pub workdir: String,
    pub remote: String,
    pub reference: GitRef,
    pub dirty: DirtyPolicy,
}

impl SourceSync {
    pub async fn run(&self, exec: &dyn Executor) -> Result<SyncOutcome, SyncError> {
        let status = exec
            .run(&self.git("status --porcelain --untracked-files=normal"))
            .await?;
        if !status.success() {
            return Err(SyncError::NotARepository {
                workdir: self.workdir.clone(),
                tail: status.tail(ERROR_TAIL_LINES),
            });
        }

        let dirty = dirty_paths(&status.stdout);
        let stash = if dirty.is_empty() {
            None
        } else {
            match self.dirty {
                DirtyPolicy::Fail => return Err(SyncError::DirtyTree { paths: dirty }),
                DirtyPolicy::Stash => Some(self.stash(exec, dirty.len()).await?),
            }
        };

        let remote = shell_quote(&self.remote);
        let reference = self.reference.as_str();

        let fetched = exec
            .run(&self.git(&format!("fetch {} {}", remote, reference)))
            .await?;
        if !fetched.success() {
            return Err(SyncError::Fetch {
                remote: self.remote.clone(),
                reference: self.reference.clone(),
                tail: fetched.tail(ERROR_TAIL_LINES),
            });
        }

        let checkout = exec
            .run(&self.git(&format!("checkout {}", reference)))
            .await?;
        if !checkout.success() {
            return Err(SyncError::Checkout {
                reference: self.reference.clone(),
                tail: checkout.tail(ERROR_TAIL_LINES),
            });
        }

        let merged = exec.run(&self.git("merge --ff-only FETCH_HEAD")).await?;
        if !merged.success() {
            return Err(SyncError::Diverged {
                reference: self.reference.clone(),
                tail: merged.tail(ERROR_TAIL_LINES),
            });
        }

        let head = exec.run_checked(&self.git("rev-parse HEAD")).await?;
        let commit = head.stdout.trim().to_string();
        if commit.len() < 40 || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SyncError::BadCommit(commit));
        }

        tracing::info!("source at {} ({})", &commit[..12], self.reference);
        Ok(SyncOutcome { commit, stash })
    }

    async fn stash(&self, exec: &dyn Executor, changes: usize) -> Result<String, SyncError> {
        let label = backup_label();
        tracing::warn!(
            "stashing {} local change(s) in {} as {}",
            changes,
            self.workdir,
            label
        );
        let stashed = exec
            .run(&self.git(&format!(
                "stash push --include-untracked -m {}",
                shell_quote(&label)
            )))
            .await?;
        if !stashed.success() {
            return Err(SyncError::Stash {
                tail: stashed.tail(ERROR_TAIL_LINES),
            });
        }
        Ok(label)
    }

    fn git(&self, args: &str) -> ShellCommand {
        ShellCommand::new(format!("git {}", args)).workdir(self.workdir.clone())
    }
}

/// Dated stash label, e.g. `deckhand-backup-20261019T101500Z`.
pub fn backup_label() -> String {
    format!("deckhand-backup-{}", Utc::now().format("%Y%m%dT%H%M%SZ"))
}

/// Paths listed by `git status --porcelain`.
fn dirty_paths(porcelain: &str) -> Vec<String> {
    porcelain
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| line[3..].to_string())
        .collect()
}
