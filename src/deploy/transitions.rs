// ABOUTME: State transition methods for deployment orchestration.
// ABOUTME: Each method consumes self and returns the next state, or Aborted on failure.

use std::marker::PhantomData;

use super::deployment::{Aborted, Deployment};
use super::error::DeployError;
use super::plan::DeployMode;
use super::state::{Built, Initialized, Patched, Started, Stopped, Synced, Verified};
use super::steps::{StepKind, StepStatus};
use crate::build::ImageBuilder;
use crate::exec::Executor;
use crate::health::{HealthVerifier, Verdict};
use crate::patch::DataPatcher;
use crate::services::ServiceController;

/// Result of a transition: the next state, or the aborted run.
pub type TransitionResult<T> = Result<Deployment<T>, Aborted>;

impl<S> Deployment<S> {
    fn transition<T>(self) -> Deployment<T> {
        Deployment {
            plan: self.plan,
            steps: self.steps,
            outcome: self.outcome,
            started: self.started,
            state: PhantomData,
        }
    }

    fn abort(mut self, kind: StepKind, error: impl Into<DeployError>) -> Aborted {
        let error = error.into();
        if self.steps.status(kind) == StepStatus::Running {
            let _ = self.steps.fail(kind, error.to_string());
        }
        tracing::error!("step {} failed: {}", kind, error);
        Aborted {
            steps: self.steps,
            error,
            plan: self.plan,
            outcome: self.outcome,
            started: self.started,
        }
    }

    fn skip<T>(mut self, kind: StepKind, reason: &str) -> TransitionResult<T> {
        match self.steps.skip(kind, reason) {
            Ok(()) => Ok(self.transition()),
            Err(e) => Err(self.abort(kind, e)),
        }
    }

    fn begin(mut self, kind: StepKind) -> Result<Self, Aborted> {
        match self.steps.begin(kind) {
            Ok(()) => Ok(self),
            Err(e) => Err(self.abort(kind, e)),
        }
    }

    fn complete<T>(mut self, kind: StepKind, detail: Option<String>) -> TransitionResult<T> {
        match self.steps.succeed(kind, detail) {
            Ok(()) => Ok(self.transition()),
            Err(e) => Err(self.abort(kind, e)),
        }
    }
}

impl Deployment<Initialized> {
    /// Bring the checkout to the requested ref.
    pub async fn sync(self, exec: &dyn Executor) -> TransitionResult<Synced> {
        if self.plan.mode == DeployMode::RestartOnly {
            return self.skip(StepKind::Sync, "restart-only");
        }
        let Some(sync) = self.plan.sync.clone() else {
            return self.skip(StepKind::Sync, "no source configured");
        };

        let mut this = self.begin(StepKind::Sync)?;
        match sync.run(exec).await {
            Ok(outcome) => {
                let mut detail = format!(
                    "{} at {}",
                    sync.reference,
                    &outcome.commit[..outcome.commit.len().min(12)]
                );
                if let Some(stash) = &outcome.stash {
                    detail.push_str(&format!(", local changes stashed as {}", stash));
                }
                this.outcome.commit = Some(outcome.commit);
                this.outcome.stash = outcome.stash;
                this.complete(StepKind::Sync, Some(detail))
            }
            Err(e) => Err(this.abort(StepKind::Sync, e)),
        }
    }
}

impl Deployment<Synced> {
    /// Rebuild images of services marked for rebuild.
    pub async fn build(self, exec: &dyn Executor) -> TransitionResult<Built> {
        let Some(mode) = self.plan.mode.build_mode() else {
            return self.skip(StepKind::Build, "restart-only");
        };
        let services = self.plan.to_build();
        if services.is_empty() {
            return self.skip(StepKind::Build, "no services marked for rebuild");
        }

        let mut this = self.begin(StepKind::Build)?;
        let result = ImageBuilder::new(exec, &this.plan.compose)
            .build(&services, mode)
            .await;
        match result {
            Ok(report) => {
                let detail = format!(
                    "{} image(s), signature {}",
                    report.services.len(),
                    report.signature
                );
                this.outcome.build = Some(report);
                this.complete(StepKind::Build, Some(detail))
            }
            Err(e) => Err(this.abort(StepKind::Build, e)),
        }
    }
}

impl Deployment<Built> {
    /// Stop the services being replaced, or the whole stack.
    pub async fn stop(self, exec: &dyn Executor) -> TransitionResult<Stopped> {
        let services = self.plan.to_stop();
        if services.is_empty() && !self.plan.full_stack {
            return self.skip(StepKind::Stop, "nothing to stop");
        }

        let this = self.begin(StepKind::Stop)?;
        let controller = ServiceController::new(exec, &this.plan.compose, this.plan.readiness);
        let result = if this.plan.full_stack {
            controller.stop_all().await
        } else {
            controller.stop(&services).await
        };
        match result {
            Ok(()) => this.complete(StepKind::Stop, None),
            Err(e) => Err(this.abort(StepKind::Stop, e)),
        }
    }
}

impl Deployment<Stopped> {
    /// Apply data corrections while the dependent services are down.
    ///
    /// A datastore removed by the stop step is started again first.
    pub async fn patch(self, exec: &dyn Executor) -> TransitionResult<Patched> {
        if self.plan.patches.is_empty() {
            return self.skip(StepKind::Patch, "no patches configured");
        }
        let Some(psql) = self.plan.psql.clone() else {
            return self.skip(StepKind::Patch, "no datastore configured");
        };

        let mut this = self.begin(StepKind::Patch)?;
        let controller = ServiceController::new(exec, &this.plan.compose, this.plan.readiness);
        let ready = controller
            .ensure_accepting(psql.service(), &psql.ready_probe())
            .await;
        if let Err(e) = ready {
            return Err(this.abort(StepKind::Patch, e));
        }

        let result = DataPatcher::new(exec, &psql, this.plan.patch_options)
            .apply(&this.plan.patches)
            .await;
        match result {
            Ok(report) => {
                let detail = if report.dry_run {
                    format!("dry run of {} patch(es), nothing applied", report.outcomes.len())
                } else {
                    format!("{} patch(es) applied", report.outcomes.len())
                };
                this.outcome.patches = Some(report);
                this.complete(StepKind::Patch, Some(detail))
            }
            Err(e) => Err(this.abort(StepKind::Patch, e)),
        }
    }
}

impl Deployment<Patched> {
    /// Start services and wait until they are running.
    pub async fn start(self, exec: &dyn Executor) -> TransitionResult<Started> {
        let services = self.plan.to_start();
        if services.is_empty() && !self.plan.full_stack {
            return self.skip(StepKind::Start, "nothing to start");
        }

        let this = self.begin(StepKind::Start)?;
        let controller = ServiceController::new(exec, &this.plan.compose, this.plan.readiness);
        let started = if this.plan.full_stack {
            controller.start_all().await
        } else {
            controller.start(&services).await
        };
        let ready = match started {
            Ok(()) => controller.wait_ready(&services).await,
            Err(e) => Err(e),
        };
        match ready {
            Ok(waited) => this.complete(
                StepKind::Start,
                Some(format!("running after {:.1}s", waited.as_secs_f64())),
            ),
            Err(e) => Err(this.abort(StepKind::Start, e)),
        }
    }
}

impl Deployment<Started> {
    /// Run health checks and post-start data queries.
    ///
    /// Failing checks do not abort the run; they become the verdict.
    pub async fn verify(self, exec: &dyn Executor) -> TransitionResult<Verified> {
        let mut this = self.begin(StepKind::Verify)?;

        let mut report = HealthVerifier::new(exec, &this.plan.compose)
            .verify(&this.plan.checks)
            .await;
        if let Some(psql) = &this.plan.psql
            && !this.plan.verify_queries.is_empty()
        {
            let results = DataPatcher::new(exec, psql, this.plan.patch_options)
                .check(&this.plan.verify_queries)
                .await;
            report.extend(results);
        }

        let verdict = report.verdict;
        let failed: Vec<String> = report.failures().map(|r| r.name.clone()).collect();
        this.outcome.health = Some(report);

        let recorded = if verdict == Verdict::Failed {
            this.steps
                .fail(StepKind::Verify, format!("failed: {}", failed.join(", ")))
        } else if failed.is_empty() {
            this.steps.succeed(StepKind::Verify, Some(verdict.to_string()))
        } else {
            this.steps.succeed(
                StepKind::Verify,
                Some(format!("{} ({} optional check(s) failing)", verdict, failed.len())),
            )
        };
        match recorded {
            Ok(()) => Ok(this.transition()),
            Err(e) => Err(this.abort(StepKind::Verify, e)),
        }
    }
}

impl Deployment<Verified> {
    pub fn verdict(&self) -> Verdict {
        self.outcome
            .health
            .as_ref()
            .map(|h| h.verdict)
            .unwrap_or(Verdict::Healthy)
    }
}
