// ABOUTME: Health verifier: HTTP and log-pattern probes with retries and a verdict.
// ABOUTME: Probes are read-only, run concurrently, and bounded by per-attempt timeouts.

pub mod http;

use futures::future::join_all;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

use crate::compose::ComposeCli;
use crate::exec::{Executor, ShellCommand, shell_quote};
use crate::types::ServiceName;

/// A single check and how hard to try it.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub name: String,
    pub kind: CheckKind,
    /// Bound on a single attempt.
    pub timeout: Duration,
    /// Total attempts (at least one is always made).
    pub retries: u32,
    /// Fixed wait between attempts.
    pub backoff: Duration,
    /// Optional checks only degrade the verdict.
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub enum CheckKind {
    Http(HttpProbe),
    Log(LogProbe),
}

#[derive(Debug, Clone)]
pub struct HttpProbe {
    pub url: String,
    pub expect_status: u16,
    pub expect_body: Option<String>,
    /// Probe with `curl` on the target instead of from this machine.
    pub via_target: bool,
}

#[derive(Debug, Clone)]
pub struct LogProbe {
    pub service: ServiceName,
    pub pattern: LogPattern,
    /// How many recent lines to scan.
    pub window: u32,
}

#[derive(Debug, Clone)]
pub enum LogPattern {
    Substring(String),
    Regex(Regex),
}

impl LogPattern {
    pub fn is_match(&self, line: &str) -> bool {
        match self {
            LogPattern::Substring(s) => line.contains(s.as_str()),
            LogPattern::Regex(re) => re.is_match(line),
        }
    }
}

impl fmt::Display for LogPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogPattern::Substring(s) => write!(f, "{:?}", s),
            LogPattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// Outcome of one check after all attempts.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub optional: bool,
    pub passed: bool,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(rename = "elapsed_ms", serialize_with = "crate::output::duration_ms")]
    pub elapsed: Duration,
}

impl CheckResult {
    pub fn passed(name: impl Into<String>, attempts: u32, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            optional: false,
            passed: true,
            attempts,
            detail: None,
            elapsed,
        }
    }

    pub fn failed(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            passed: false,
            attempts: 1,
            detail: Some(detail.into()),
            elapsed: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Healthy,
    Degraded,
    Failed,
}

impl Verdict {
    pub fn from_results(results: &[CheckResult]) -> Self {
        if results.iter().any(|r| !r.passed && !r.optional) {
            Verdict::Failed
        } else if results.iter().any(|r| !r.passed) {
            Verdict::Degraded
        } else {
            Verdict::Healthy
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Healthy => write!(f, "healthy"),
            Verdict::Degraded => write!(f, "degraded"),
            Verdict::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub verdict: Verdict,
    pub results: Vec<CheckResult>,
}

impl HealthReport {
    pub fn new(results: Vec<CheckResult>) -> Self {
        Self {
            verdict: Verdict::from_results(&results),
            results,
        }
    }

    /// Merge further results (e.g. post-start data queries) and recompute the verdict.
    pub fn extend(&mut self, results: impl IntoIterator<Item = CheckResult>) {
        self.results.extend(results);
        self.verdict = Verdict::from_results(&self.results);
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    /// One line per check, then the verdict.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            let mark = if result.passed { "✓" } else { "✗" };
            out.push_str(&format!(
                "  {} {}{}",
                mark,
                result.name,
                if result.optional { " (optional)" } else { "" }
            ));
            if let Some(detail) = &result.detail {
                out.push_str(&format!(": {}", detail));
            }
            if result.attempts > 1 {
                out.push_str(&format!(" [{} attempts]", result.attempts));
            }
            out.push('\n');
        }
        out.push_str(&format!("verdict: {}\n", self.verdict));
        out
    }
}

pub struct HealthVerifier<'a> {
    exec: &'a dyn Executor,
    compose: &'a ComposeCli,
}

impl<'a> HealthVerifier<'a> {
    pub fn new(exec: &'a dyn Executor, compose: &'a ComposeCli) -> Self {
        Self { exec, compose }
    }

    /// Run every check concurrently and aggregate a verdict.
    pub async fn verify(&self, checks: &[HealthCheck]) -> HealthReport {
        if checks.is_empty() {
            tracing::warn!("no health checks configured; reporting healthy");
        }
        let results = join_all(checks.iter().map(|c| self.run_check(c))).await;
        HealthReport::new(results)
    }

    async fn run_check(&self, check: &HealthCheck) -> CheckResult {
        let started = Instant::now();
        let attempts = check.retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let outcome = match tokio::time::timeout(check.timeout, self.probe(check)).await {
                Ok(result) => result,
                Err(_) => Err(format!("timed out after {:?}", check.timeout)),
            };

            match outcome {
                Ok(()) => {
                    tracing::info!("check {} passed on attempt {}", check.name, attempt);
                    return CheckResult {
                        name: check.name.clone(),
                        optional: check.optional,
                        passed: true,
                        attempts: attempt,
                        detail: None,
                        elapsed: started.elapsed(),
                    };
                }
                Err(reason) => {
                    tracing::debug!(
                        "check {} attempt {}/{} failed: {}",
                        check.name,
                        attempt,
                        attempts,
                        reason
                    );
                    last_error = reason;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(check.backoff).await;
            }
        }

        tracing::warn!("check {} failed: {}", check.name, last_error);
        CheckResult {
            name: check.name.clone(),
            optional: check.optional,
            passed: false,
            attempts,
            detail: Some(last_error),
            elapsed: started.elapsed(),
        }
    }

    async fn probe(&self, check: &HealthCheck) -> Result<(), String> {
        match &check.kind {
            CheckKind::Http(probe) => self.probe_http(probe, check.timeout).await,
            CheckKind::Log(probe) => self.probe_log(probe).await,
        }
    }

    async fn probe_http(&self, probe: &HttpProbe, timeout: Duration) -> Result<(), String> {
        let response = if probe.via_target {
            let secs = timeout.as_secs().max(1);
            let cmd = ShellCommand::new(format!(
                "curl -sS -m {} -w '\\n%{{http_code}}' {}",
                secs,
                shell_quote(&probe.url)
            ));
            let output = self.exec.run(&cmd).await.map_err(|e| e.to_string())?;
            if !output.success() && output.stdout.trim().is_empty() {
                return Err(format!("curl exited {}: {}", output.exit_code, output.stderr.trim()));
            }
            http::parse_curl_output(&output.stdout)?
        } else {
            http::get(&probe.url).await?
        };

        if response.status != probe.expect_status {
            return Err(format!(
                "expected status {}, got {}",
                probe.expect_status, response.status
            ));
        }
        if let Some(expected) = &probe.expect_body
            && !response.body.contains(expected.as_str())
        {
            return Err(format!("response body does not contain {:?}", expected));
        }
        Ok(())
    }

    async fn probe_log(&self, probe: &LogProbe) -> Result<(), String> {
        let cmd = self.compose.command(&format!(
            "logs --no-color --tail {} {}",
            probe.window, probe.service
        ));
        let output = self.exec.run_checked(&cmd).await.map_err(|e| e.to_string())?;

        let log = output.combined();
        if log.lines().any(|line| probe.pattern.is_match(line)) {
            Ok(())
        } else {
            Err(format!(
                "{} not found in the last {} lines of {}",
                probe.pattern, probe.window, probe.service
            ))
        }
    }
}
