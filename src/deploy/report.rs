// ABOUTME: End-of-run summary: step statuses, artifacts, verdict, and remediation.
// ABOUTME: Rendered for humans or serialized as JSON.

use serde::Serialize;
use std::fmt::Write;
use std::time::Duration;

use super::deployment::RunOutcome;
use super::error::{DeployError, DeployErrorKind};
use super::plan::{DeployMode, DeployPlan};
use super::steps::{StepKind, StepLog, StepRecord, StepStatus};
use crate::error::exit_code;
use crate::health::Verdict;

#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepKind>,
    pub kind: DeployErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub project: String,
    pub target: String,
    pub mode: DeployMode,
    pub full_stack: bool,
    pub steps: Vec<StepRecord>,
    #[serde(flatten)]
    pub outcome: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(rename = "elapsed_ms", serialize_with = "crate::output::duration_ms")]
    pub elapsed: Duration,
}

impl DeployReport {
    pub(crate) fn new(
        plan: &DeployPlan,
        steps: &StepLog,
        outcome: &RunOutcome,
        elapsed: Duration,
        target: &str,
        error: Option<&DeployError>,
    ) -> Self {
        let verdict = outcome.health.as_ref().map(|h| h.verdict);

        let failure = error.map(|e| FailureSummary {
            step: steps.failed().or_else(|| steps.running()),
            kind: e.kind(),
            message: e.to_string(),
            tail: e.tail().map(str::to_string),
        });

        let remediation = match (error, verdict) {
            (Some(e), _) => e.remediation(&plan.compose),
            (None, Some(Verdict::Failed | Verdict::Degraded)) => {
                let services: Vec<String> =
                    plan.to_start().iter().map(|s| s.to_string()).collect();
                Some(format!(
                    "inspect `{} logs {}`; if the old code is still running, redeploy with `--mode prune`",
                    plan.compose.program(),
                    services.join(" ")
                ))
            }
            _ => None,
        };

        Self {
            project: plan.project.to_string(),
            target: target.to_string(),
            mode: plan.mode,
            full_stack: plan.full_stack,
            steps: steps.records().to_vec(),
            outcome: outcome.clone(),
            verdict,
            failure,
            remediation,
            elapsed,
        }
    }

    /// 0 for healthy and degraded runs, otherwise the code of the failure class.
    pub fn exit_code(&self) -> i32 {
        match (&self.failure, self.verdict) {
            (Some(failure), _) => failure.kind.exit_code(),
            (None, Some(Verdict::Failed)) => exit_code::HEALTH,
            _ => exit_code::SUCCESS,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code() == exit_code::SUCCESS
    }

    /// Things that did not fail the run but deserve attention.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(stash) = &self.outcome.stash {
            warnings.push(format!(
                "local changes on the target were stashed as {} (`git stash list`)",
                stash
            ));
        }
        if let Some(patches) = &self.outcome.patches
            && patches.dry_run
        {
            warnings.push("patches ran as a dry run; no data was changed".to_string());
        }
        if let Some(health) = &self.outcome.health
            && health.verdict == Verdict::Degraded
        {
            for result in health.failures() {
                warnings.push(format!(
                    "optional check {} failing: {}",
                    result.name,
                    result.detail.as_deref().unwrap_or("no detail")
                ));
            }
        }
        warnings
    }

    /// Human-readable summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} on {} (mode {}{})",
            self.project,
            self.target,
            self.mode,
            if self.full_stack { ", full stack" } else { "" }
        );

        for step in &self.steps {
            let mark = match step.status {
                StepStatus::Succeeded => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Skipped => "-",
                StepStatus::Running => "…",
                StepStatus::Pending => " ",
            };
            let _ = write!(out, "  {} {:<7} {}", mark, step.kind.to_string(), step.status);
            if let Some(detail) = &step.detail {
                let _ = write!(out, ": {}", detail);
            }
            if let Some(elapsed) = step.elapsed {
                let _ = write!(out, " ({:.1}s)", elapsed.as_secs_f64());
            }
            out.push('\n');
        }

        if let Some(health) = &self.outcome.health {
            for result in &health.results {
                let mark = if result.passed { "✓" } else { "✗" };
                let _ = write!(
                    out,
                    "    {} {}{}",
                    mark,
                    result.name,
                    if result.optional { " (optional)" } else { "" }
                );
                if let Some(detail) = &result.detail {
                    let _ = write!(out, ": {}", detail);
                }
                out.push('\n');
            }
            let _ = writeln!(out, "verdict: {}", health.verdict);
        }

        if let Some(failure) = &self.failure {
            match failure.step {
                Some(step) => {
                    let _ = writeln!(out, "failed at {}: {}", step, failure.message);
                }
                None => {
                    let _ = writeln!(out, "failed: {}", failure.message);
                }
            }
            if let Some(tail) = &failure.tail {
                for line in tail.lines() {
                    let _ = writeln!(out, "  | {}", line);
                }
            }
        }

        if let Some(remediation) = &self.remediation {
            let _ = writeln!(out, "next: {}", remediation);
        }
        let _ = writeln!(out, "elapsed {:.1}s", self.elapsed.as_secs_f64());
        out
    }
}
