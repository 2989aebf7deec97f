// ABOUTME: Deploy lock to prevent concurrent runs against the same target.
// ABOUTME: Uses atomic file creation with lock info stored in ~/.local/state/deckhand/.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::exec::{Executor, ShellCommand, shell_quote};
use crate::types::ServiceName;

use super::error::{DeployError, LockHolderInfo};

/// Base directory for deckhand state files (XDG Base Directory compliant).
const STATE_DIR: &str = ".local/state/deckhand";

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// Project being deployed.
    pub project: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(project: &ServiceName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            project: project.to_string(),
        }
    }

    /// Whether the lock is older than `stale_after`.
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        let age = Utc::now() - self.started_at;
        age.to_std().is_ok_and(|age| age >= stale_after)
    }

    /// Path to the lock file for a project.
    /// Uses $HOME for shell expansion compatibility.
    pub fn lock_path(project: &ServiceName) -> String {
        format!("$HOME/{}/{}.lock", STATE_DIR, project)
    }
}

/// How an existing lock may be broken.
#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    /// Break any existing lock.
    pub force: bool,
    /// Break locks older than this.
    pub stale_after: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            force: false,
            stale_after: Duration::from_secs(60 * 60),
        }
    }
}

/// A held deploy lock. Release it with [`DeployLock::release`] or use [`DeployLock::with_lock`].
pub struct DeployLock<'a> {
    exec: &'a dyn Executor,
    project: ServiceName,
}

impl std::fmt::Debug for DeployLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployLock")
            .field("project", &self.project)
            .field("target", &self.exec.describe())
            .finish()
    }
}

impl<'a> DeployLock<'a> {
    /// Acquire the deploy lock for `project` on the executor's target.
    ///
    /// Uses shell noclobber mode for atomic lock acquisition (no TOCTOU race).
    /// Returns error if the lock is already held by another process.
    /// Breaks stale locks with a warning, and any lock when forced.
    pub async fn acquire(
        exec: &'a dyn Executor,
        project: &ServiceName,
        policy: LockPolicy,
    ) -> Result<Self, DeployError> {
        let lock_path = LockInfo::lock_path(project);

        Self::ensure_state_dir(exec).await?;

        let lock_info = LockInfo::new(project);
        let lock_json = serde_json::to_string(&lock_info)
            .map_err(|e| DeployError::lock_error(format!("failed to serialize lock: {}", e)))?;

        // set -C makes > fail if the file already exists.
        // Double quotes expand $HOME in the path.
        let acquire_cmd = ShellCommand::new(format!(
            "(set -C; echo {} > \"{}\") 2>/dev/null",
            shell_quote(&lock_json),
            lock_path
        ));

        let result = exec
            .run(&acquire_cmd)
            .await
            .map_err(|e| DeployError::lock_error(format!("failed to acquire lock: {}", e)))?;

        if result.success() {
            tracing::debug!("acquired deploy lock {}", lock_path);
            return Ok(Self {
                exec,
                project: project.clone(),
            });
        }

        match Self::read_existing(exec, &lock_path).await? {
            Some(existing) if !policy.force && !existing.is_stale(policy.stale_after) => {
                return Err(DeployError::LockHeld {
                    project: existing.project,
                    holder: LockHolderInfo {
                        host: existing.holder,
                        pid: existing.pid,
                    },
                    started_at: existing.started_at,
                });
            }
            Some(existing) => {
                tracing::warn!(
                    "breaking {} lock held by {} (pid {}) since {}",
                    if policy.force { "forced" } else { "stale" },
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
            }
            None => tracing::warn!("lock info unreadable or corrupted, breaking lock"),
        }

        let _ = exec
            .run(&ShellCommand::new(format!("rm -f \"{}\"", lock_path)))
            .await;

        let result = exec
            .run(&acquire_cmd)
            .await
            .map_err(|e| DeployError::lock_error(format!("failed to acquire lock: {}", e)))?;

        if !result.success() {
            return Err(DeployError::lock_error(
                "lock acquired by another process during break",
            ));
        }

        Ok(Self {
            exec,
            project: project.clone(),
        })
    }

    /// Ensure the state directory exists on the target.
    async fn ensure_state_dir(exec: &dyn Executor) -> Result<(), DeployError> {
        let cmd = ShellCommand::new(format!("mkdir -p \"$HOME/{}\"", STATE_DIR));
        let output = exec.run(&cmd).await.map_err(|e| {
            DeployError::lock_error(format!("failed to create state directory: {}", e))
        })?;

        if !output.success() {
            return Err(DeployError::lock_error(format!(
                "failed to create state directory: {}",
                output.stderr.trim()
            )));
        }
        Ok(())
    }

    /// Current holder, or None when the lock file is unreadable or corrupted.
    async fn read_existing(
        exec: &dyn Executor,
        lock_path: &str,
    ) -> Result<Option<LockInfo>, DeployError> {
        let output = exec
            .run(&ShellCommand::new(format!("cat \"{}\"", lock_path)))
            .await
            .map_err(|e| DeployError::lock_error(format!("failed to read lock info: {}", e)))?;

        if !output.success() {
            return Ok(None);
        }
        Ok(serde_json::from_str::<LockInfo>(output.stdout.trim()).ok())
    }

    /// Who holds the lock for `project` right now, if anyone.
    pub async fn current_holder(
        exec: &dyn Executor,
        project: &ServiceName,
    ) -> Result<Option<LockInfo>, DeployError> {
        Self::read_existing(exec, &LockInfo::lock_path(project)).await
    }

    /// Release the lock.
    pub async fn release(self) -> Result<(), DeployError> {
        let lock_path = LockInfo::lock_path(&self.project);
        let output = self
            .exec
            .run(&ShellCommand::new(format!("rm -f \"{}\"", lock_path)))
            .await
            .map_err(|e| DeployError::lock_error(format!("failed to release lock: {}", e)))?;
        if !output.success() {
            return Err(DeployError::lock_error(format!(
                "failed to release lock: {}",
                output.stderr.trim()
            )));
        }
        tracing::debug!("released deploy lock {}", lock_path);
        Ok(())
    }

    /// Run `work` while holding the lock.
    ///
    /// The lock is released whether `work` finishes or the process receives
    /// Ctrl-C; on interrupt `work` is dropped, which aborts its in-flight command.
    pub async fn with_lock<F, T>(
        exec: &'a dyn Executor,
        project: &ServiceName,
        policy: LockPolicy,
        work: F,
    ) -> Result<T, DeployError>
    where
        F: Future<Output = T>,
    {
        let lock = Self::acquire(exec, project, policy).await?;

        let result = tokio::select! {
            value = work => Ok(value),
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted; releasing deploy lock");
                Err(DeployError::Interrupted)
            }
        };

        if let Err(e) = lock.release().await {
            tracing::warn!("{}", e);
        }
        result
    }
}
