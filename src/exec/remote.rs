// ABOUTME: Executor that runs commands on a remote host over an SSH session.
// ABOUTME: Environment is exported inline because SSH servers usually reject setenv requests.

use async_trait::async_trait;
use snafu::ResultExt;
use std::time::Duration;

use super::command::{CommandOutput, ShellCommand};
use super::error::{ExecError, RemoteSnafu};
use super::Executor;
use crate::ssh::Session;

#[derive(Debug)]
pub struct SshExecutor {
    session: Session,
    default_timeout: Duration,
}

impl SshExecutor {
    pub fn new(session: Session, default_timeout: Duration) -> Self {
        Self {
            session,
            default_timeout,
        }
    }

    pub async fn disconnect(self) -> Result<(), crate::ssh::Error> {
        self.session.disconnect().await
    }
}

#[async_trait]
impl Executor for SshExecutor {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, ExecError> {
        let timeout = command.timeout_override().unwrap_or(self.default_timeout);
        let output = self
            .session
            .exec_with_timeout(&command.render_inline(), timeout)
            .await
            .context(RemoteSnafu {
                command: command.to_string(),
            })?;

        Ok(CommandOutput {
            exit_code: i32::try_from(output.exit_code).unwrap_or(i32::MAX),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn describe(&self) -> String {
        self.session.label()
    }
}
