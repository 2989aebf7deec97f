// ABOUTME: Verify command implementation.
// ABOUTME: Runs health checks and verify queries against the running stack without changing it.

use super::target_connection::{close, connect, emit_warnings};
use deckhand::config::Config;
use deckhand::diagnostics::Diagnostics;
use deckhand::error::{Error, Result, exit_code};
use deckhand::health::{HealthVerifier, Verdict};
use deckhand::output::Output;
use deckhand::patch::{DataPatcher, PatchOptions};
use std::path::Path;

pub async fn verify(config: Config, audit_log: Option<&Path>, mut output: Output) -> Result<i32> {
    let checks = config.health_checks()?;
    let psql = config.psql()?;
    let compose = config.compose();

    output.start_timer();
    let mut diag = Diagnostics::default();
    let exec = connect(&config, audit_log, &output, &mut diag).await?;

    output.progress(&format!("  → Running {} health check(s)...", checks.len()));
    let mut report = HealthVerifier::new(&exec, &compose).verify(&checks).await;

    if let Some(psql) = &psql
        && !config.verify_queries.is_empty()
    {
        output.progress(&format!(
            "  → Running {} verify quer(ies)...",
            config.verify_queries.len()
        ));
        let patcher = DataPatcher::new(&exec, psql, PatchOptions::default());
        report.extend(patcher.check(&config.verify_queries).await);
    }

    close(exec, &mut diag).await;

    output.report(&report.render(), &report);
    emit_warnings(&output, &diag);

    match report.verdict {
        Verdict::Failed => Err(Error::Unhealthy(report.verdict)),
        Verdict::Degraded => {
            for failure in report.failures() {
                output.warning(&format!(
                    "optional check {} failing: {}",
                    failure.name,
                    failure.detail.as_deref().unwrap_or("no detail")
                ));
            }
            Ok(exit_code::SUCCESS)
        }
        Verdict::Healthy => {
            output.success("All checks passed");
            Ok(exit_code::SUCCESS)
        }
    }
}
