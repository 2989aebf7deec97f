// ABOUTME: Data patcher: applies ordered, idempotent data corrections before services start.
// ABOUTME: Guards deletes with row-count caps and supports a dry run that changes nothing.

mod psql;
mod statement;

pub use psql::{PsqlClient, affected_rows};
pub use statement::{Estimate, Patch, SqlValue, Statement, quote_literal, validate_identifier};

use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

use crate::exec::{ERROR_TAIL_LINES, ExecError, Executor};
use crate::health::CheckResult;

/// Switches for one patch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchOptions {
    /// Report what would change and apply nothing.
    pub dry_run: bool,
    /// Permit unbounded deletes and `sql` statements flagged destructive.
    pub allow_destructive: bool,
}

/// A post-start query whose trimmed output must equal `expect`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VerifyQuery {
    pub name: String,
    pub query: String,
    pub expect: String,
}

#[derive(Debug, Error)]
pub enum PatchFailure {
    #[error("refused without --allow-destructive")]
    Refused,

    #[error("{matched} rows match, more than max_rows {max_rows}")]
    TooManyRows { matched: u64, max_rows: u64 },

    #[error("could not read row count from {0:?}")]
    BadCount(String),

    #[error("statement failed with status {exit_code}")]
    Statement { exit_code: i32, tail: String },

    #[error(transparent)]
    Exec(#[from] ExecError),
}

#[derive(Debug, Error)]
#[error("patch {statement} failed: {reason}{}", applied_suffix(applied))]
pub struct PatchError {
    /// Name of the patch that failed.
    pub statement: String,
    /// Patches that were fully applied before the failure.
    pub applied: Vec<String>,
    pub reason: PatchFailure,
}

fn applied_suffix(applied: &[String]) -> String {
    if applied.is_empty() {
        " (nothing applied)".to_string()
    } else {
        format!(" (already applied: {})", applied.join(", "))
    }
}

impl PatchError {
    pub fn tail(&self) -> Option<&str> {
        match &self.reason {
            PatchFailure::Statement { tail, .. } => Some(tail),
            PatchFailure::Exec(e) => e.tail(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchOutcome {
    pub name: String,
    pub kind: &'static str,
    /// Rows changed, or that would change in a dry run. `None` when unknown.
    pub affected: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PatchReport {
    pub dry_run: bool,
    pub outcomes: Vec<PatchOutcome>,
}

impl PatchReport {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for outcome in &self.outcomes {
            let rows = match outcome.affected {
                Some(n) if self.dry_run => format!("would affect {} row(s)", n),
                Some(n) => format!("{} row(s)", n),
                None => "rows unknown".to_string(),
            };
            out.push_str(&format!("  {} ({}): {}", outcome.name, outcome.kind, rows));
            if let Some(note) = &outcome.note {
                out.push_str(&format!(", {}", note));
            }
            out.push('\n');
        }
        if self.dry_run {
            out.push_str("dry run: nothing was changed\n");
        }
        out
    }
}

pub struct DataPatcher<'a> {
    exec: &'a dyn Executor,
    psql: &'a PsqlClient,
    options: PatchOptions,
}

impl<'a> DataPatcher<'a> {
    pub fn new(exec: &'a dyn Executor, psql: &'a PsqlClient, options: PatchOptions) -> Self {
        Self {
            exec,
            psql,
            options,
        }
    }

    /// Apply `patches` in order, stopping at the first failure.
    pub async fn apply(&self, patches: &[Patch]) -> Result<PatchReport, PatchError> {
        if !self.options.dry_run
            && !self.options.allow_destructive
            && let Some(risky) = patches.iter().find(|p| p.statement.needs_permission())
        {
            return Err(PatchError {
                statement: risky.name.clone(),
                applied: Vec::new(),
                reason: PatchFailure::Refused,
            });
        }

        let mut report = PatchReport {
            dry_run: self.options.dry_run,
            outcomes: Vec::with_capacity(patches.len()),
        };

        for patch in patches {
            let outcome = if self.options.dry_run {
                self.estimate(patch).await
            } else {
                self.apply_one(patch).await
            };

            match outcome {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(reason) => {
                    let applied = if self.options.dry_run {
                        Vec::new()
                    } else {
                        report.outcomes.iter().map(|o| o.name.clone()).collect()
                    };
                    return Err(PatchError {
                        statement: patch.name.clone(),
                        applied,
                        reason,
                    });
                }
            }
        }

        Ok(report)
    }

    async fn apply_one(&self, patch: &Patch) -> Result<PatchOutcome, PatchFailure> {
        let sql = patch.statement.render();
        // ALTER TYPE .. ADD VALUE cannot run inside a transaction block before PostgreSQL 12.
        let single_transaction = !matches!(patch.statement, Statement::AddEnumValue { .. });
        tracing::info!("applying patch {}: {}", patch.name, patch.statement);

        let output = self
            .exec
            .run(&self.psql.command(&sql, single_transaction))
            .await?;
        if !output.success() {
            if let Some((matched, max_rows)) = statement::over_cap(&output.stderr) {
                return Err(PatchFailure::TooManyRows { matched, max_rows });
            }
            return Err(PatchFailure::Statement {
                exit_code: output.exit_code,
                tail: output.tail(ERROR_TAIL_LINES),
            });
        }

        let affected = match patch.statement {
            Statement::AddEnumValue { .. } => None,
            Statement::Delete {
                max_rows: Some(_), ..
            } => statement::deleted_rows(&output.stderr),
            _ => Some(affected_rows(&output.stdout)),
        };
        Ok(PatchOutcome {
            name: patch.name.clone(),
            kind: patch.statement.kind(),
            affected,
            note: None,
        })
    }

    async fn estimate(&self, patch: &Patch) -> Result<PatchOutcome, PatchFailure> {
        let mut outcome = PatchOutcome {
            name: patch.name.clone(),
            kind: patch.statement.kind(),
            affected: None,
            note: None,
        };

        let Some((kind, queries)) = patch.statement.estimate() else {
            outcome.note = Some("raw sql; effect not estimated".to_string());
            return Ok(outcome);
        };

        let stdout = self.psql.query(self.exec, &queries).await?;
        let affected = match kind {
            Estimate::RowCount => parse_count(&stdout)?,
            Estimate::MissingCount => stdout.lines().filter(|l| l.trim() == "t").count() as u64,
        };
        outcome.affected = Some(affected);

        match &patch.statement {
            Statement::Delete {
                max_rows: Some(max_rows),
                ..
            } if affected > *max_rows => {
                outcome.note = Some(format!("exceeds max_rows {}; would abort", max_rows));
            }
            stmt if stmt.needs_permission() && !self.options.allow_destructive => {
                outcome.note = Some("requires --allow-destructive".to_string());
            }
            _ => {}
        }

        tracing::info!(
            "dry run: {} would affect {} row(s)",
            patch.name,
            affected
        );
        Ok(outcome)
    }

    /// Run post-start queries; each becomes a required check result.
    pub async fn check(&self, queries: &[VerifyQuery]) -> Vec<CheckResult> {
        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            let started = Instant::now();
            let result = match self.psql.query(self.exec, &[query.query.clone()]).await {
                Ok(stdout) if stdout.trim() == query.expect.trim() => {
                    CheckResult::passed(&query.name, 1, started.elapsed())
                }
                Ok(stdout) => CheckResult::failed(
                    &query.name,
                    format!("expected {:?}, got {:?}", query.expect.trim(), stdout.trim()),
                ),
                Err(e) => CheckResult::failed(&query.name, e.to_string()),
            };
            results.push(result);
        }
        results
    }
}

fn parse_count(stdout: &str) -> Result<u64, PatchFailure> {
    stdout
        .trim()
        .parse::<u64>()
        .map_err(|_| PatchFailure::BadCount(stdout.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_lists_applied_patches() {
        let err = PatchError {
            statement: "seed".to_string(),
            applied: vec!["status-enum".to_string(), "purge".to_string()],
            reason: PatchFailure::Statement {
                exit_code: 3,
                tail: "ERROR: relation \"plans\" does not exist".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("patch seed failed"));
        assert!(msg.contains("already applied: status-enum, purge"));
        assert!(err.tail().unwrap().contains("does not exist"));
    }

    #[test]
    fn error_says_when_nothing_applied() {
        let err = PatchError {
            statement: "purge".to_string(),
            applied: Vec::new(),
            reason: PatchFailure::TooManyRows {
                matched: 900,
                max_rows: 50,
            },
        };
        assert!(err.to_string().ends_with("(nothing applied)"));
    }

    #[test]
    fn parses_counts() {
        assert_eq!(parse_count("42\n").unwrap(), 42);
        assert!(parse_count("ERROR").is_err());
    }

    #[test]
    fn dry_run_report_says_nothing_changed() {
        let report = PatchReport {
            dry_run: true,
            outcomes: vec![PatchOutcome {
                name: "purge-orphans".to_string(),
                kind: "delete",
                affected: Some(5),
                note: None,
            }],
        };
        let text = report.render();
        assert!(text.contains("purge-orphans (delete): would affect 5 row(s)"));
        assert!(text.ends_with("dry run: nothing was changed\n"));
    }
}
