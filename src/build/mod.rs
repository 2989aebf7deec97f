// ABOUTME: Image builder: rebuilds service images with layer caching disabled.
// ABOUTME: Each run carries a fresh build signature; prune mode clears builder cache first.

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

use crate::compose::ComposeCli;
use crate::exec::{ERROR_TAIL_LINES, ExecError, Executor, ShellCommand, tail_lines};
use crate::types::ServiceName;

/// Build-arg carrying the per-run signature into every image build.
pub const BUILD_ID_ARG: &str = "DECKHAND_BUILD_ID";

/// Markers that show a layer was reused from cache (BuildKit and the legacy builder).
const CACHE_HIT_MARKERS: &[&str] = &[" CACHED", "Using cache"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildMode {
    /// `build --no-cache`.
    NoCache,
    /// Prune builder cache and dangling images, then `build --no-cache`.
    Prune,
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::NoCache => write!(f, "no-cache"),
            BuildMode::Prune => write!(f, "prune"),
        }
    }
}

/// Unique identity of one build invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BuildSignature(Uuid);

impl BuildSignature {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BuildSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("pruning builder cache failed: {tail}")]
    Prune { tail: String },

    #[error("building {service} failed with status {exit_code}")]
    Failed {
        service: ServiceName,
        exit_code: i32,
        tail: String,
    },

    #[error("{service} reused cached layers despite --no-cache (`{marker}`)")]
    StaleLayers {
        service: ServiceName,
        marker: String,
        tail: String,
    },

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl BuildError {
    pub fn tail(&self) -> Option<&str> {
        match self {
            BuildError::Prune { tail }
            | BuildError::Failed { tail, .. }
            | BuildError::StaleLayers { tail, .. } => Some(tail),
            BuildError::Exec(e) => e.tail(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceBuild {
    pub service: ServiceName,
    #[serde(rename = "duration_ms", serialize_with = "crate::output::duration_ms")]
    pub duration: Duration,
}

/// Per-service outcome of a build step.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub signature: BuildSignature,
    pub mode: BuildMode,
    pub services: Vec<ServiceBuild>,
}

pub struct ImageBuilder<'a> {
    exec: &'a dyn Executor,
    compose: &'a ComposeCli,
}

impl<'a> ImageBuilder<'a> {
    pub fn new(exec: &'a dyn Executor, compose: &'a ComposeCli) -> Self {
        Self { exec, compose }
    }

    /// Rebuild `services` in order, stopping at the first failure.
    pub async fn build(
        &self,
        services: &[ServiceName],
        mode: BuildMode,
    ) -> Result<BuildReport, BuildError> {
        let signature = BuildSignature::fresh();

        if mode == BuildMode::Prune {
            self.prune().await?;
        }

        let mut built = Vec::with_capacity(services.len());
        for service in services {
            let started = Instant::now();
            tracing::info!("building {} (signature {})", service, signature);

            let output = self
                .exec
                .run(&self.build_command(service, &signature))
                .await?;
            let log = output.combined();

            if !output.success() {
                return Err(BuildError::Failed {
                    service: service.clone(),
                    exit_code: output.exit_code,
                    tail: tail_lines(&log, ERROR_TAIL_LINES),
                });
            }

            if let Some(marker) = find_cache_hit(&log) {
                return Err(BuildError::StaleLayers {
                    service: service.clone(),
                    marker: marker.trim().to_string(),
                    tail: tail_lines(&log, ERROR_TAIL_LINES),
                });
            }

            built.push(ServiceBuild {
                service: service.clone(),
                duration: started.elapsed(),
            });
        }

        Ok(BuildReport {
            signature,
            mode,
            services: built,
        })
    }

    async fn prune(&self) -> Result<(), BuildError> {
        tracing::warn!("pruning all builder cache and dangling images before rebuild");
        for cmd in [
            ShellCommand::new("docker builder prune --all --force"),
            ShellCommand::new("docker image prune --force"),
        ] {
            let output = self.exec.run(&cmd).await?;
            if !output.success() {
                return Err(BuildError::Prune {
                    tail: output.tail(ERROR_TAIL_LINES),
                });
            }
        }
        Ok(())
    }

    fn build_command(&self, service: &ServiceName, signature: &BuildSignature) -> ShellCommand {
        self.compose.command(&format!(
            "build --no-cache --pull --build-arg {}={} {}",
            BUILD_ID_ARG, signature, service
        ))
    }
}

/// First log line showing a cache hit, if any.
pub fn find_cache_hit(log: &str) -> Option<&str> {
    log.lines()
        .find(|line| CACHE_HIT_MARKERS.iter().any(|m| line.contains(m)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_are_unique() {
        assert_ne!(BuildSignature::fresh(), BuildSignature::fresh());
    }

    #[test]
    fn detects_buildkit_cache_hits() {
        let log = "#4 [2/5] COPY requirements.txt .\n#4 CACHED\n#5 [3/5] RUN pip install";
        assert_eq!(find_cache_hit(log), Some("#4 CACHED"));
    }

    #[test]
    fn detects_legacy_cache_hits() {
        let log = "Step 3/7 : COPY . /app\n ---> Using cache\n ---> 3f2a";
        assert_eq!(find_cache_hit(log), Some(" ---> Using cache"));
    }

    #[test]
    fn fresh_build_log_has_no_cache_hit() {
        let log = "#4 [2/5] COPY . /app\n#4 DONE 0.3s\n#5 exporting layers";
        assert_eq!(find_cache_hit(log), None);
    }
}
