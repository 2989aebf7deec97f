// ABOUTME: Deployment target: the local shell or one SSH host.
// ABOUTME: Connect once per run and close on every exit path.

use async_trait::async_trait;
use snafu::ResultExt;
use std::time::Duration;

use super::command::{CommandOutput, ShellCommand};
use super::error::{ConnectionSnafu, ExecError};
use super::{Executor, LocalExecutor, SshExecutor};
use crate::config::SshTarget;
use crate::ssh::Session;

#[derive(Debug)]
pub enum Target {
    Local(LocalExecutor),
    Ssh(SshExecutor),
}

impl Target {
    /// Open the command channel for a target; `None` means the local shell.
    pub async fn connect(
        target: Option<&SshTarget>,
        command_timeout: Duration,
    ) -> Result<Self, ExecError> {
        match target {
            None => Ok(Target::Local(LocalExecutor::new(command_timeout))),
            Some(ssh) => {
                tracing::info!("connecting to {}", ssh.label());
                let session = Session::connect(ssh.session_config())
                    .await
                    .context(ConnectionSnafu {
                        target: ssh.label(),
                    })?;
                Ok(Target::Ssh(SshExecutor::new(session, command_timeout)))
            }
        }
    }

    /// Tear down the channel. A no-op for the local shell.
    pub async fn close(self) -> Result<(), ExecError> {
        match self {
            Target::Local(_) => Ok(()),
            Target::Ssh(exec) => {
                let label = exec.describe();
                exec.disconnect()
                    .await
                    .context(ConnectionSnafu { target: label })
            }
        }
    }
}

#[async_trait]
impl Executor for Target {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, ExecError> {
        match self {
            Target::Local(exec) => exec.run(command).await,
            Target::Ssh(exec) => exec.run(command).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Target::Local(exec) => exec.describe(),
            Target::Ssh(exec) => exec.describe(),
        }
    }
}
