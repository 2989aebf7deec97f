// ABOUTME: Generic deployment struct parameterized by state marker.
// ABOUTME: Carries the plan, the step log, and what each finished step produced.

use serde::Serialize;
use std::marker::PhantomData;
use std::time::Instant;

use super::error::DeployError;
use super::plan::DeployPlan;
use super::report::DeployReport;
use super::state::Initialized;
use super::steps::StepLog;
use crate::build::BuildReport;
use crate::health::HealthReport;
use crate::patch::PatchReport;

/// A deployment in progress, parameterized by its current state.
///
/// Each transition consumes the deployment and returns it in the next state,
/// so a step can only run once everything before it has finished.
#[derive(Debug)]
pub struct Deployment<S> {
    pub(crate) plan: DeployPlan,
    pub(crate) steps: StepLog,
    pub(crate) outcome: RunOutcome,
    pub(crate) started: Instant,
    pub(crate) state: PhantomData<S>,
}

/// Artifacts produced by finished steps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Label of the stash holding local changes moved aside by sync.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patches: Option<PatchReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthReport>,
}

impl Deployment<Initialized> {
    pub fn new(plan: DeployPlan) -> Self {
        Deployment {
            plan,
            steps: StepLog::new(),
            outcome: RunOutcome::default(),
            started: Instant::now(),
            state: PhantomData,
        }
    }
}

impl<S> Deployment<S> {
    pub fn plan(&self) -> &DeployPlan {
        &self.plan
    }

    pub fn steps(&self) -> &StepLog {
        &self.steps
    }

    pub fn outcome(&self) -> &RunOutcome {
        &self.outcome
    }

    /// Summary of the run so far.
    pub fn report(&self, target: &str) -> DeployReport {
        DeployReport::new(
            &self.plan,
            &self.steps,
            &self.outcome,
            self.started.elapsed(),
            target,
            None,
        )
    }
}

/// A run stopped by an error. Steps after the failing one stay pending.
#[derive(Debug)]
pub struct Aborted {
    pub steps: StepLog,
    pub error: DeployError,
    pub(crate) plan: DeployPlan,
    pub(crate) outcome: RunOutcome,
    pub(crate) started: Instant,
}

impl Aborted {
    pub fn report(&self, target: &str) -> DeployReport {
        DeployReport::new(
            &self.plan,
            &self.steps,
            &self.outcome,
            self.started.elapsed(),
            target,
            Some(&self.error),
        )
    }
}
