// ABOUTME: Ordered deployment steps and their statuses.
// ABOUTME: The step log refuses to start or finish a step out of order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Stages of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Sync,
    Build,
    Stop,
    Patch,
    Start,
    Verify,
}

impl StepKind {
    pub const ALL: [StepKind; 6] = [
        StepKind::Sync,
        StepKind::Build,
        StepKind::Stop,
        StepKind::Patch,
        StepKind::Start,
        StepKind::Verify,
    ];
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::Sync => "sync",
            StepKind::Build => "build",
            StepKind::Stop => "stop",
            StepKind::Patch => "patch",
            StepKind::Start => "start",
            StepKind::Verify => "verify",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    fn is_done(self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Skipped)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StepOrderError {
    #[error("cannot begin {step}: {blocking} is {status}")]
    Blocked {
        step: StepKind,
        blocking: StepKind,
        status: StepStatus,
    },

    #[error("step {step} is {status}, expected {expected}")]
    WrongStatus {
        step: StepKind,
        status: StepStatus,
        expected: StepStatus,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub kind: StepKind,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "elapsed_ms",
        serialize_with = "crate::output::duration_ms_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub elapsed: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip)]
    clock: Option<Instant>,
}

/// Status of every step of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct StepLog {
    records: Vec<StepRecord>,
}

impl Default for StepLog {
    fn default() -> Self {
        Self::new()
    }
}

impl StepLog {
    pub fn new() -> Self {
        Self {
            records: StepKind::ALL
                .iter()
                .map(|&kind| StepRecord {
                    kind,
                    status: StepStatus::Pending,
                    started_at: None,
                    elapsed: None,
                    detail: None,
                    clock: None,
                })
                .collect(),
        }
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn status(&self, kind: StepKind) -> StepStatus {
        self.record(kind).status
    }

    /// The step that failed, if any.
    pub fn failed(&self) -> Option<StepKind> {
        self.records
            .iter()
            .find(|r| r.status == StepStatus::Failed)
            .map(|r| r.kind)
    }

    /// The step currently running, if any.
    pub fn running(&self) -> Option<StepKind> {
        self.records
            .iter()
            .find(|r| r.status == StepStatus::Running)
            .map(|r| r.kind)
    }

    /// Mark `kind` running once every earlier step has succeeded or been skipped.
    pub fn begin(&mut self, kind: StepKind) -> Result<(), StepOrderError> {
        self.check_ready(kind)?;
        let record = self.record_mut(kind);
        record.status = StepStatus::Running;
        record.started_at = Some(Utc::now());
        record.clock = Some(Instant::now());
        tracing::info!("step {} started", kind);
        Ok(())
    }

    pub fn succeed(
        &mut self,
        kind: StepKind,
        detail: Option<String>,
    ) -> Result<(), StepOrderError> {
        self.finish(kind, StepStatus::Succeeded, detail)
    }

    pub fn fail(&mut self, kind: StepKind, detail: impl Into<String>) -> Result<(), StepOrderError> {
        self.finish(kind, StepStatus::Failed, Some(detail.into()))
    }

    /// Skip a pending step; earlier steps must already be done.
    pub fn skip(&mut self, kind: StepKind, reason: impl Into<String>) -> Result<(), StepOrderError> {
        self.check_ready(kind)?;
        let record = self.record_mut(kind);
        record.status = StepStatus::Skipped;
        record.detail = Some(reason.into());
        tracing::info!("step {} skipped", kind);
        Ok(())
    }

    fn check_ready(&self, kind: StepKind) -> Result<(), StepOrderError> {
        if let Some(blocking) = self
            .records
            .iter()
            .take_while(|r| r.kind < kind)
            .find(|r| !r.status.is_done())
        {
            return Err(StepOrderError::Blocked {
                step: kind,
                blocking: blocking.kind,
                status: blocking.status,
            });
        }
        let status = self.status(kind);
        if status != StepStatus::Pending {
            return Err(StepOrderError::WrongStatus {
                step: kind,
                status,
                expected: StepStatus::Pending,
            });
        }
        Ok(())
    }

    fn finish(
        &mut self,
        kind: StepKind,
        status: StepStatus,
        detail: Option<String>,
    ) -> Result<(), StepOrderError> {
        let record = self.record_mut(kind);
        if record.status != StepStatus::Running {
            return Err(StepOrderError::WrongStatus {
                step: kind,
                status: record.status,
                expected: StepStatus::Running,
            });
        }
        record.status = status;
        record.elapsed = record.clock.map(|c| c.elapsed());
        if detail.is_some() {
            record.detail = detail;
        }
        tracing::info!("step {} {}", kind, status);
        Ok(())
    }

    fn record(&self, kind: StepKind) -> &StepRecord {
        &self.records[kind as usize]
    }

    fn record_mut(&mut self, kind: StepKind) -> &mut StepRecord {
        &mut self.records[kind as usize]
    }
}
