// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Runs sync, build, stop, patch, start, and verify strictly in order.

mod deployment;
mod error;
mod lock;
mod plan;
mod report;
mod state;
mod steps;
mod transitions;

pub use deployment::{Aborted, Deployment, RunOutcome};
pub use error::{DeployError, DeployErrorKind, LockHolderInfo};
pub use lock::{DeployLock, LockInfo, LockPolicy};
pub use plan::{DeployMode, DeployOptions, DeployPlan};
pub use report::{DeployReport, FailureSummary};
pub use state::{Built, Initialized, Patched, Started, Stopped, Synced, Verified};
pub use steps::{StepKind, StepLog, StepOrderError, StepRecord, StepStatus};
pub use transitions::TransitionResult;

use crate::exec::Executor;

/// Drive a deployment through every step and summarize it.
///
/// `announce` is called as each step is about to run.
pub async fn execute(
    deployment: Deployment<Initialized>,
    exec: &dyn Executor,
    announce: &(dyn Fn(StepKind) + Sync),
) -> DeployReport {
    let target = exec.describe();
    match run_steps(deployment, exec, announce).await {
        Ok(verified) => verified.report(&target),
        Err(aborted) => aborted.report(&target),
    }
}

async fn run_steps(
    deployment: Deployment<Initialized>,
    exec: &dyn Executor,
    announce: &(dyn Fn(StepKind) + Sync),
) -> Result<Deployment<Verified>, Aborted> {
    announce(StepKind::Sync);
    let deployment = deployment.sync(exec).await?;
    announce(StepKind::Build);
    let deployment = deployment.build(exec).await?;
    announce(StepKind::Stop);
    let deployment = deployment.stop(exec).await?;
    announce(StepKind::Patch);
    let deployment = deployment.patch(exec).await?;
    announce(StepKind::Start);
    let deployment = deployment.start(exec).await?;
    announce(StepKind::Verify);
    deployment.verify(exec).await
}
