// ABOUTME: Patch command implementation.
// ABOUTME: Applies the configured data patches under the deploy lock, outside a full deploy.

use super::target_connection::{close, connect, emit_warnings};
use deckhand::config::Config;
use deckhand::deploy::{DeployLock, LockPolicy};
use deckhand::diagnostics::Diagnostics;
use deckhand::error::{Error, Result, exit_code};
use deckhand::output::Output;
use deckhand::patch::{DataPatcher, PatchOptions};
use std::path::Path;

pub async fn patch(
    config: Config,
    options: PatchOptions,
    force_lock: bool,
    audit_log: Option<&Path>,
    mut output: Output,
) -> Result<i32> {
    let Some(psql) = config.psql()? else {
        return Err(Error::InvalidConfig(
            "patching requires a datastore section".to_string(),
        ));
    };
    if config.patches.is_empty() {
        output.success("No patches configured");
        return Ok(exit_code::SUCCESS);
    }

    output.start_timer();
    let mut diag = Diagnostics::default();
    let exec = connect(&config, audit_log, &output, &mut diag).await?;

    output.progress(&format!(
        "  → {} {} patch(es)...",
        if options.dry_run { "Estimating" } else { "Applying" },
        config.patches.len()
    ));
    let policy = LockPolicy {
        force: force_lock,
        stale_after: config.lock_stale_after,
    };
    let patcher = DataPatcher::new(&exec, &psql, options);
    let result =
        DeployLock::with_lock(&exec, &config.project, policy, patcher.apply(&config.patches)).await;

    close(exec, &mut diag).await;
    emit_warnings(&output, &diag);

    let report = result??;
    output.report(&report.render(), &report);
    if !report.dry_run {
        output.success("Patches applied");
    }
    Ok(exit_code::SUCCESS)
}
