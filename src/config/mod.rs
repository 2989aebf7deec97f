// ABOUTME: Configuration types and parsing for deckhand.yml.
// ABOUTME: Handles YAML parsing, validation, env interpolation, and destination merging.

mod datastore;
mod deserialize;
mod env_value;
mod healthcheck;
mod init;
mod target;

pub use datastore::DatastoreConfig;
pub use env_value::EnvValue;
pub use healthcheck::{HealthcheckConfig, HttpCheckConfig, LogCheckConfig, MAX_LOG_WINDOW};
pub use init::{TEMPLATE, init_config};
pub use target::SshTarget;

use deserialize::{
    deserialize_git_ref, deserialize_git_ref_option, deserialize_service_name,
    deserialize_services, deserialize_services_option, deserialize_target,
};

use crate::compose::ComposeCli;
use crate::error::{Error, Result};
use crate::health::HealthCheck;
use crate::patch::{Patch, PsqlClient, VerifyQuery};
use crate::services::{Readiness, ServiceTarget};
use crate::sync::DirtyPolicy;
use crate::types::{GitRef, ServiceName};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "deckhand.yml";
pub const CONFIG_FILENAME_ALT: &str = "deckhand.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".deckhand/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Label used for the run lock and in summaries.
    #[serde(deserialize_with = "deserialize_service_name")]
    pub project: ServiceName,

    /// Remote host; absent means the local shell.
    #[serde(default, deserialize_with = "deserialize_target")]
    pub target: Option<SshTarget>,

    /// Checkout directory holding the compose file.
    pub workdir: String,

    #[serde(default = "default_compose_file")]
    pub compose_file: String,

    #[serde(default = "default_compose_command")]
    pub compose_command: String,

    #[serde(default)]
    pub source: Option<SourceConfig>,

    #[serde(deserialize_with = "deserialize_services")]
    pub services: NonEmpty<ServiceTarget>,

    #[serde(default = "default_grace_period", with = "humantime_serde")]
    pub grace_period: Duration,

    #[serde(default = "default_ready_timeout", with = "humantime_serde")]
    pub ready_timeout: Duration,

    #[serde(default = "default_ready_poll_interval", with = "humantime_serde")]
    pub ready_poll_interval: Duration,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,

    #[serde(default = "default_lock_stale_after", with = "humantime_serde")]
    pub lock_stale_after: Duration,

    #[serde(default)]
    pub healthchecks: Vec<HealthcheckConfig>,

    #[serde(default)]
    pub datastore: Option<DatastoreConfig>,

    #[serde(default)]
    pub patches: Vec<Patch>,

    #[serde(default)]
    pub verify_queries: Vec<VerifyQuery>,

    #[serde(default)]
    pub destinations: HashMap<String, Destination>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(rename = "ref", default, deserialize_with = "deserialize_git_ref")]
    pub reference: GitRef,

    #[serde(default)]
    pub dirty: DirtyPolicy,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Destination {
    #[serde(default, deserialize_with = "deserialize_target")]
    pub target: Option<SshTarget>,

    #[serde(default)]
    pub workdir: Option<String>,

    #[serde(default)]
    pub source: Option<SourceOverride>,

    #[serde(default, deserialize_with = "deserialize_services_option")]
    pub services: Option<NonEmpty<ServiceTarget>>,

    #[serde(default)]
    pub healthchecks: Option<Vec<HealthcheckConfig>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SourceOverride {
    #[serde(default)]
    pub remote: Option<String>,

    #[serde(rename = "ref", default, deserialize_with = "deserialize_git_ref_option")]
    pub reference: Option<GitRef>,

    #[serde(default)]
    pub dirty: Option<DirtyPolicy>,
}

fn default_compose_file() -> String {
    "docker-compose.yml".to_string()
}

fn default_compose_command() -> String {
    "docker compose".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_grace_period() -> Duration {
    Duration::from_secs(10)
}

fn default_ready_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_ready_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_lock_stale_after() -> Duration {
    Duration::from_secs(60 * 60)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn for_destination(&self, name: &str) -> Result<Config> {
        let dest = self
            .destinations
            .get(name)
            .ok_or_else(|| Error::UnknownDestination(name.to_string()))?;

        let mut merged = self.clone();

        if let Some(target) = &dest.target {
            merged.target = Some(target.clone());
        }

        if let Some(workdir) = &dest.workdir {
            merged.workdir = workdir.clone();
        }

        if let Some(over) = &dest.source {
            let mut source = merged.source.take().unwrap_or_else(|| SourceConfig {
                remote: default_remote(),
                reference: GitRef::default(),
                dirty: DirtyPolicy::default(),
            });
            if let Some(remote) = &over.remote {
                source.remote = remote.clone();
            }
            if let Some(reference) = &over.reference {
                source.reference = reference.clone();
            }
            if let Some(dirty) = over.dirty {
                source.dirty = dirty;
            }
            merged.source = Some(source);
        }

        if let Some(services) = &dest.services {
            merged.services = services.clone();
        }

        if let Some(healthchecks) = &dest.healthchecks {
            merged.healthchecks = healthchecks.clone();
        }

        Ok(merged)
    }

    /// Cross-field checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.workdir.trim().is_empty() {
            return Err(Error::InvalidConfig("workdir must not be empty".to_string()));
        }
        if self.compose_command.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "compose_command must not be empty".to_string(),
            ));
        }
        if self.ready_poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "ready_poll_interval must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if !seen.insert(&service.name) {
                return Err(Error::InvalidConfig(format!(
                    "service {} is listed twice",
                    service.name
                )));
            }
        }

        unique_names("healthcheck", self.healthchecks.iter().map(|h| h.name.as_str()))?;
        self.health_checks()?;

        unique_names("patch", self.patches.iter().map(|p| p.name.as_str()))?;
        for patch in &self.patches {
            patch
                .statement
                .validate()
                .map_err(|e| Error::InvalidConfig(format!("patch {}: {}", patch.name, e)))?;
        }

        unique_names("verify query", self.verify_queries.iter().map(|q| q.name.as_str()))?;

        if self.datastore.is_none() && (!self.patches.is_empty() || !self.verify_queries.is_empty())
        {
            return Err(Error::InvalidConfig(
                "patches and verify_queries require a datastore section".to_string(),
            ));
        }

        Ok(())
    }

    pub fn compose(&self) -> ComposeCli {
        ComposeCli::new(&self.compose_command, &self.compose_file, &self.workdir)
    }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            grace_period: self.grace_period,
            timeout: self.ready_timeout,
            poll_interval: self.ready_poll_interval,
        }
    }

    pub fn health_checks(&self) -> Result<Vec<HealthCheck>> {
        self.healthchecks
            .iter()
            .map(|h| h.to_check().map_err(Error::InvalidConfig))
            .collect()
    }

    /// The psql client, with credentials resolved from the environment.
    pub fn psql(&self) -> Result<Option<PsqlClient>> {
        self.datastore
            .as_ref()
            .map(|d| d.client(self.compose()))
            .transpose()
    }

    /// Services restricted to `only`, in configured order. Unknown names are an error.
    pub fn select_services(&self, only: &[String]) -> Result<Vec<ServiceTarget>> {
        if only.is_empty() {
            return Ok(self.services.iter().cloned().collect());
        }
        for name in only {
            if !self.services.iter().any(|s| s.name.as_str() == name) {
                return Err(Error::InvalidConfig(format!(
                    "service {} is not in the configured services",
                    name
                )));
            }
        }
        Ok(self
            .services
            .iter()
            .filter(|s| only.iter().any(|n| n == s.name.as_str()))
            .cloned()
            .collect())
    }

    /// Parse the scaffold written by `deckhand init`.
    pub fn template() -> Result<Self> {
        Self::from_yaml(TEMPLATE)
    }
}

fn unique_names<'a>(what: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(Error::InvalidConfig(format!("{} name must not be empty", what)));
        }
        if !seen.insert(name) {
            return Err(Error::InvalidConfig(format!(
                "{} name {} is used twice",
                what, name
            )));
        }
    }
    Ok(())
}
