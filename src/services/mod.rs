// ABOUTME: Service controller: stops and starts a chosen subset of compose services.
// ABOUTME: Readiness is polled after a grace period instead of relying on fixed sleeps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::compose::{ComposeCli, service_args};
use crate::exec::{ERROR_TAIL_LINES, ExecError, Executor, ShellCommand};
use crate::types::ServiceName;

/// Lifecycle action requested for a service during a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    /// Stop, then start again.
    #[default]
    Restart,
    /// Only make sure it is started.
    Start,
    /// Only stop it.
    Stop,
}

/// A named service with its desired action and whether its image is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceTarget {
    pub name: ServiceName,
    pub action: ServiceAction,
    pub rebuild: bool,
}

impl ServiceTarget {
    pub fn new(name: ServiceName) -> Self {
        Self {
            name,
            action: ServiceAction::Restart,
            rebuild: true,
        }
    }

    pub fn stops(&self) -> bool {
        matches!(self.action, ServiceAction::Restart | ServiceAction::Stop)
    }

    pub fn starts(&self) -> bool {
        matches!(self.action, ServiceAction::Restart | ServiceAction::Start)
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("stopping {services} failed: {source}")]
    Stop { services: String, source: ExecError },

    #[error("starting {services} failed: {source}")]
    Start { services: String, source: ExecError },

    #[error("{} not running after {waited:?}", missing.join(", "))]
    NotReady {
        missing: Vec<String>,
        waited: Duration,
        tail: String,
    },

    #[error("querying service state failed: {0}")]
    Query(#[source] ExecError),
}

impl ServiceError {
    pub fn tail(&self) -> Option<&str> {
        match self {
            ServiceError::Stop { source, .. }
            | ServiceError::Start { source, .. }
            | ServiceError::Query(source) => source.tail(),
            ServiceError::NotReady { tail, .. } => Some(tail),
        }
    }

    pub fn source_exec(&self) -> Option<&ExecError> {
        match self {
            ServiceError::Stop { source, .. }
            | ServiceError::Start { source, .. }
            | ServiceError::Query(source) => Some(source),
            ServiceError::NotReady { .. } => None,
        }
    }
}

/// Timing for the wait between start and health verification.
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub grace_period: Duration,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
        }
    }
}

pub struct ServiceController<'a> {
    exec: &'a dyn Executor,
    compose: &'a ComposeCli,
    readiness: Readiness,
}

impl<'a> ServiceController<'a> {
    pub fn new(exec: &'a dyn Executor, compose: &'a ComposeCli, readiness: Readiness) -> Self {
        Self {
            exec,
            compose,
            readiness,
        }
    }

    /// Stop and remove the containers of `services`, leaving everything else running.
    pub async fn stop(&self, services: &[ServiceName]) -> Result<(), ServiceError> {
        if services.is_empty() {
            return Ok(());
        }
        let names = service_args(services);
        tracing::info!("stopping {}", names);
        for args in [format!("stop {}", names), format!("rm -f {}", names)] {
            self.exec
                .run_checked(&self.compose.command(&args))
                .await
                .map_err(|source| ServiceError::Stop {
                    services: names.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Start only `services`, without touching their dependencies.
    pub async fn start(&self, services: &[ServiceName]) -> Result<(), ServiceError> {
        if services.is_empty() {
            return Ok(());
        }
        let names = service_args(services);
        tracing::info!("starting {}", names);
        self.exec
            .run_checked(&self.compose.command(&format!("up -d --no-deps {}", names)))
            .await
            .map_err(|source| ServiceError::Start {
                services: names,
                source,
            })?;
        Ok(())
    }

    /// Bring the whole stack down.
    pub async fn stop_all(&self) -> Result<(), ServiceError> {
        tracing::info!("stopping the full stack");
        self.exec
            .run_checked(&self.compose.command("down --remove-orphans"))
            .await
            .map_err(|source| ServiceError::Stop {
                services: "all services".to_string(),
                source,
            })?;
        Ok(())
    }

    /// Bring the whole stack up.
    pub async fn start_all(&self) -> Result<(), ServiceError> {
        tracing::info!("starting the full stack");
        self.exec
            .run_checked(&self.compose.command("up -d"))
            .await
            .map_err(|source| ServiceError::Start {
                services: "all services".to_string(),
                source,
            })?;
        Ok(())
    }

    /// Names of services whose containers are currently running.
    pub async fn running(&self) -> Result<BTreeSet<String>, ServiceError> {
        let output = self
            .exec
            .run_checked(&self.compose.command("ps --status running --services"))
            .await
            .map_err(ServiceError::Query)?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// `compose ps` output for status displays.
    pub async fn status(&self) -> Result<String, ServiceError> {
        let output = self
            .exec
            .run_checked(&self.compose.command("ps"))
            .await
            .map_err(ServiceError::Query)?;
        Ok(output.stdout)
    }

    /// Wait out the grace period, then poll until every service in `services` is running.
    pub async fn wait_ready(&self, services: &[ServiceName]) -> Result<Duration, ServiceError> {
        let started = Instant::now();
        if !self.readiness.grace_period.is_zero() {
            tracing::debug!("grace period {:?}", self.readiness.grace_period);
            tokio::time::sleep(self.readiness.grace_period).await;
        }

        let deadline = started + self.readiness.grace_period + self.readiness.timeout;
        loop {
            let running = self.running().await?;
            let missing: Vec<String> = services
                .iter()
                .map(|s| s.to_string())
                .filter(|s| !running.contains(s))
                .collect();

            if missing.is_empty() {
                return Ok(started.elapsed());
            }

            if Instant::now() >= deadline {
                let tail = self.logs_tail(&missing).await;
                return Err(ServiceError::NotReady {
                    missing,
                    waited: started.elapsed(),
                    tail,
                });
            }

            tracing::debug!("waiting for {}", missing.join(", "));
            tokio::time::sleep(self.readiness.poll_interval).await;
        }
    }

    /// Start `service` if its container is gone, then poll `probe` until it succeeds.
    pub async fn ensure_accepting(
        &self,
        service: &ServiceName,
        probe: &ShellCommand,
    ) -> Result<Duration, ServiceError> {
        let started = Instant::now();
        if !self.running().await?.contains(service.as_str()) {
            tracing::info!("{} is down; starting it", service);
            self.start(std::slice::from_ref(service)).await?;
        }

        let deadline = started + self.readiness.timeout;
        loop {
            let output = self.exec.run(probe).await.map_err(ServiceError::Query)?;
            if output.success() {
                return Ok(started.elapsed());
            }
            if Instant::now() >= deadline {
                return Err(ServiceError::NotReady {
                    missing: vec![service.to_string()],
                    waited: started.elapsed(),
                    tail: output.tail(ERROR_TAIL_LINES),
                });
            }
            tracing::debug!("waiting for {} to accept connections", service);
            tokio::time::sleep(self.readiness.poll_interval).await;
        }
    }

    async fn logs_tail(&self, services: &[String]) -> String {
        let cmd = self
            .compose
            .command(&format!("logs --no-color --tail 30 {}", services.join(" ")));
        match self.exec.run(&cmd).await {
            Ok(output) => output.combined(),
            Err(e) => format!("(could not read logs: {})", e),
        }
    }
}
