// ABOUTME: Shared helpers for loading config and opening the target connection.
// ABOUTME: Used by deploy, verify, patch, and status so each connects and closes the same way.

use deckhand::config::Config;
use deckhand::diagnostics::{Diagnostics, Warning};
use deckhand::error::{Error, Result};
use deckhand::exec::{AuditTrail, Audited, Executor, Target};
use deckhand::output::Output;
use std::path::Path;
use std::sync::Arc;

/// Load, merge the destination into, and validate the configuration.
pub fn load_config(path: Option<&Path>, destination: Option<&str>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::discover(&std::env::current_dir()?)?,
    };
    let config = match destination {
        Some(dest) => config.for_destination(dest)?,
        None => config,
    };
    config.validate()?;
    Ok(config)
}

/// Connect to the configured target with every command recorded in the audit trail.
pub async fn connect(
    config: &Config,
    audit_log: Option<&Path>,
    output: &Output,
    diag: &mut Diagnostics,
) -> Result<Audited<Target>> {
    if let Some(datastore) = &config.datastore
        && datastore.has_literal_password()
    {
        diag.warn(Warning::plaintext_secret(
            "datastore.password is written in the config file; prefer `password: { env: ... }`",
        ));
    }

    let trail = match audit_log {
        Some(path) => AuditTrail::with_file(path)?,
        None => AuditTrail::new(),
    };

    match &config.target {
        Some(target) => output.progress(&format!("  → Connecting to {}...", target.label())),
        None => output.progress("  → Running against the local host"),
    }
    let target = Target::connect(config.target.as_ref(), config.command_timeout)
        .await
        .map_err(Error::from)?;
    Ok(Audited::new(target, Arc::new(trail)))
}

/// Close the connection; failure only warns.
pub async fn close(exec: Audited<Target>, diag: &mut Diagnostics) {
    let commands = exec.trail().entries().len();
    tracing::debug!("{} command(s) executed", commands);
    let target = exec.into_inner();
    let label = target.describe();
    if let Err(e) = target.close().await {
        diag.warn(Warning::disconnect(format!(
            "closing connection to {} failed: {}",
            label, e
        )));
    }
}

/// Print collected warnings.
pub fn emit_warnings(output: &Output, diag: &Diagnostics) {
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }
}
