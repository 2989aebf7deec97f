// ABOUTME: What a deployment run will do, resolved from config and CLI options.
// ABOUTME: Decides which steps run and which services each step touches.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::build::BuildMode;
use crate::compose::ComposeCli;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::health::HealthCheck;
use crate::patch::{Patch, PatchOptions, PsqlClient, VerifyQuery};
use crate::services::{Readiness, ServiceTarget};
use crate::sync::{DirtyPolicy, SourceSync};
use crate::types::{GitRef, ServiceName};

/// How images are refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployMode {
    /// Sync, then rebuild without layer cache.
    #[default]
    NoCache,
    /// Sync, prune builder cache, then rebuild without layer cache.
    Prune,
    /// Skip sync and build; only restart services.
    RestartOnly,
}

impl DeployMode {
    pub fn build_mode(self) -> Option<BuildMode> {
        match self {
            DeployMode::NoCache => Some(BuildMode::NoCache),
            DeployMode::Prune => Some(BuildMode::Prune),
            DeployMode::RestartOnly => None,
        }
    }
}

impl FromStr for DeployMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "no-cache" => Ok(DeployMode::NoCache),
            "prune" => Ok(DeployMode::Prune),
            "restart-only" => Ok(DeployMode::RestartOnly),
            other => Err(format!(
                "unknown mode {} (expected no-cache, prune or restart-only)",
                other
            )),
        }
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployMode::NoCache => write!(f, "no-cache"),
            DeployMode::Prune => write!(f, "prune"),
            DeployMode::RestartOnly => write!(f, "restart-only"),
        }
    }
}

/// Options given on the command line.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Restrict the run to these services; empty means all configured services.
    pub services: Vec<String>,
    pub reference: Option<GitRef>,
    pub mode: DeployMode,
    pub full_stack: bool,
    pub dirty: Option<DirtyPolicy>,
    pub patch: PatchOptions,
}

/// Everything a run needs, resolved up front so steps cannot fail on configuration.
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub project: ServiceName,
    pub compose: ComposeCli,
    pub mode: DeployMode,
    pub full_stack: bool,
    pub sync: Option<SourceSync>,
    pub services: Vec<ServiceTarget>,
    pub readiness: Readiness,
    pub checks: Vec<HealthCheck>,
    pub psql: Option<PsqlClient>,
    pub patches: Vec<Patch>,
    pub verify_queries: Vec<VerifyQuery>,
    pub patch_options: PatchOptions,
}

impl DeployPlan {
    pub fn from_config(config: &Config, options: &DeployOptions) -> Result<Self> {
        let services = config.select_services(&options.services)?;
        if options.full_stack && !options.services.is_empty() {
            return Err(Error::InvalidConfig(
                "--full-stack restarts every service; drop --services".to_string(),
            ));
        }

        let sync = config.source.as_ref().map(|source| SourceSync {
            workdir: config.workdir.clone(),
            remote: source.remote.clone(),
            reference: options
                .reference
                .clone()
                .unwrap_or_else(|| source.reference.clone()),
            dirty: options.dirty.unwrap_or(source.dirty),
        });
        if sync.is_none() && options.reference.is_some() {
            return Err(Error::InvalidConfig(
                "--ref given but no source section is configured".to_string(),
            ));
        }

        Ok(Self {
            project: config.project.clone(),
            compose: config.compose(),
            mode: options.mode,
            full_stack: options.full_stack,
            sync,
            services,
            readiness: config.readiness(),
            checks: config.health_checks()?,
            psql: config.psql()?,
            patches: config.patches.clone(),
            verify_queries: config.verify_queries.clone(),
            patch_options: options.patch,
        })
    }

    /// Services whose images are rebuilt.
    pub fn to_build(&self) -> Vec<ServiceName> {
        self.services
            .iter()
            .filter(|s| s.rebuild && s.starts())
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn to_stop(&self) -> Vec<ServiceName> {
        self.services
            .iter()
            .filter(|s| s.stops())
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn to_start(&self) -> Vec<ServiceName> {
        self.services
            .iter()
            .filter(|s| s.starts())
            .map(|s| s.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
project: shop
workdir: /opt/shop
source: { ref: main }
services:
  - backend
  - { name: router, rebuild: false }
  - { name: waha, action: stop, rebuild: false }
"#;

    #[test]
    fn mode_parses_from_cli_values() {
        assert_eq!("restart-only".parse::<DeployMode>(), Ok(DeployMode::RestartOnly));
        assert!("fast".parse::<DeployMode>().is_err());
        assert_eq!(DeployMode::RestartOnly.build_mode(), None);
    }

    #[test]
    fn service_sets_follow_actions() {
        let config = Config::from_yaml(YAML).unwrap();
        let plan = DeployPlan::from_config(&config, &DeployOptions::default()).unwrap();
        let names = |v: Vec<ServiceName>| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(names(plan.to_build()), vec!["backend"]);
        assert_eq!(names(plan.to_stop()), vec!["backend", "router", "waha"]);
        assert_eq!(names(plan.to_start()), vec!["backend", "router"]);
    }

    #[test]
    fn cli_ref_and_dirty_override_config() {
        let config = Config::from_yaml(YAML).unwrap();
        let options = DeployOptions {
            reference: Some(GitRef::new("release/2026-10").unwrap()),
            dirty: Some(DirtyPolicy::Stash),
            ..Default::default()
        };
        let plan = DeployPlan::from_config(&config, &options).unwrap();
        let sync = plan.sync.unwrap();
        assert_eq!(sync.reference.as_str(), "release/2026-10");
        assert_eq!(sync.dirty, DirtyPolicy::Stash);
    }

    #[test]
    fn unknown_service_filter_is_rejected() {
        let config = Config::from_yaml(YAML).unwrap();
        let options = DeployOptions {
            services: vec!["frontend".to_string()],
            ..Default::default()
        };
        assert!(DeployPlan::from_config(&config, &options).is_err());
    }
}
