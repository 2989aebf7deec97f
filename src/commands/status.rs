// ABOUTME: Status command implementation.
// ABOUTME: Shows compose service state and who, if anyone, holds the deploy lock.

use super::target_connection::{close, connect, emit_warnings};
use deckhand::config::Config;
use deckhand::deploy::{DeployLock, LockInfo};
use deckhand::diagnostics::Diagnostics;
use deckhand::error::{Result, exit_code};
use deckhand::output::Output;
use deckhand::services::ServiceController;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct StatusReport {
    project: String,
    target: String,
    services: String,
    lock: Option<LockInfo>,
}

pub async fn status(config: Config, audit_log: Option<&Path>, output: Output) -> Result<i32> {
    let compose = config.compose();
    let mut diag = Diagnostics::default();
    let exec = connect(&config, audit_log, &output, &mut diag).await?;

    let services = ServiceController::new(&exec, &compose, config.readiness())
        .status()
        .await;
    let lock = DeployLock::current_holder(&exec, &config.project).await;
    let target = config
        .target
        .as_ref()
        .map(|t| t.label())
        .unwrap_or_else(|| "local".to_string());

    close(exec, &mut diag).await;
    emit_warnings(&output, &diag);

    let report = StatusReport {
        project: config.project.to_string(),
        target,
        services: services?,
        lock: lock?,
    };

    let mut rendered = format!("{} on {}\n{}", report.project, report.target, report.services);
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    match &report.lock {
        Some(lock) => rendered.push_str(&format!(
            "deploy lock held by {} (pid {}) since {}\n",
            lock.holder, lock.pid, lock.started_at
        )),
        None => rendered.push_str("deploy lock free\n"),
    }
    output.report(&rendered, &report);
    Ok(exit_code::SUCCESS)
}
