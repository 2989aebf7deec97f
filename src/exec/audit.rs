// ABOUTME: Timestamped audit trail of every command a run executes.
// ABOUTME: Entries go to tracing, an in-memory list, and optionally a JSON-lines file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::command::{CommandOutput, ShellCommand};
use super::error::ExecError;
use super::Executor;

/// One executed command.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub started_at: DateTime<Utc>,
    pub target: String,
    /// Redacted command line.
    pub command: String,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Default)]
pub struct AuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
    sink: Option<Mutex<File>>,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("entries", &self.entries.lock().len())
            .field("file", &self.sink.is_some())
            .finish()
    }
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append each entry as a JSON line to `path`.
    pub fn with_file(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            entries: Mutex::new(Vec::new()),
            sink: Some(Mutex::new(file)),
        })
    }

    pub fn record(&self, entry: AuditEntry) {
        tracing::info!(
            target: "deckhand::audit",
            started_at = %entry.started_at.to_rfc3339(),
            exec_target = %entry.target,
            exit_code = ?entry.exit_code,
            duration_ms = entry.duration_ms,
            "{}",
            entry.command
        );

        if let Some(sink) = &self.sink
            && let Ok(line) = serde_json::to_string(&entry)
        {
            let mut file = sink.lock();
            if let Err(e) = writeln!(file, "{line}") {
                tracing::warn!("failed to write audit log: {}", e);
            }
        }

        self.entries.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

/// Wraps an executor so every command lands in an [`AuditTrail`].
#[derive(Debug)]
pub struct Audited<E> {
    inner: E,
    trail: Arc<AuditTrail>,
}

impl<E: Executor> Audited<E> {
    pub fn new(inner: E, trail: Arc<AuditTrail>) -> Self {
        Self { inner, trail }
    }

    pub fn trail(&self) -> &AuditTrail {
        &self.trail
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

#[async_trait]
impl<E: Executor> Executor for Audited<E> {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, ExecError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let result = self.inner.run(command).await;

        self.trail.record(AuditEntry {
            started_at,
            target: self.inner.describe(),
            command: command.to_string(),
            duration_ms: clock.elapsed().as_millis() as u64,
            exit_code: result.as_ref().ok().map(|o| o.exit_code),
            error: result.as_ref().err().map(|e| e.to_string()),
        });

        result
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}
