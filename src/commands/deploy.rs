// ABOUTME: Deploy command implementation.
// ABOUTME: Plans the run, takes the deploy lock, and drives the step sequence to a report.

use super::target_connection::{close, connect, emit_warnings};
use deckhand::config::Config;
use deckhand::deploy::{
    DeployLock, DeployOptions, DeployPlan, Deployment, LockPolicy, StepKind, execute,
};
use deckhand::diagnostics::Diagnostics;
use deckhand::error::Result;
use deckhand::output::Output;
use std::path::Path;

/// Deploy the configured project and return the process exit code.
pub async fn deploy(
    config: Config,
    options: DeployOptions,
    force_lock: bool,
    audit_log: Option<&Path>,
    mut output: Output,
) -> Result<i32> {
    // Plan errors are config errors and must surface before anything touches the target.
    let plan = DeployPlan::from_config(&config, &options)?;

    output.start_timer();
    let mut diag = Diagnostics::default();

    output.progress(&format!(
        "Deploying {} ({} service(s), mode {})",
        plan.project,
        plan.services.len(),
        plan.mode
    ));

    let exec = connect(&config, audit_log, &output, &mut diag).await?;

    output.progress("  → Acquiring deploy lock...");
    let announce = |step: StepKind| output.progress(&format!("  → {}...", step));
    let policy = LockPolicy {
        force: force_lock,
        stale_after: config.lock_stale_after,
    };
    let result = DeployLock::with_lock(
        &exec,
        &config.project,
        policy,
        execute(Deployment::new(plan), &exec, &announce),
    )
    .await;

    close(exec, &mut diag).await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            emit_warnings(&output, &diag);
            return Err(e.into());
        }
    };

    output.report(&report.render(), &report);
    for warning in report.warnings() {
        output.warning(&warning);
    }
    emit_warnings(&output, &diag);

    if report.succeeded() {
        output.success("Deployment complete!");
    }
    Ok(report.exit_code())
}
