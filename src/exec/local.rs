// ABOUTME: Executor that runs commands in the current machine's shell.
// ABOUTME: Children are killed when their future is dropped, so interrupts abort in-flight work.

use async_trait::async_trait;
use snafu::ResultExt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::command::{CommandOutput, ShellCommand};
use super::error::{ExecError, SpawnSnafu};
use super::Executor;

#[derive(Debug, Clone)]
pub struct LocalExecutor {
    default_timeout: Duration,
}

impl LocalExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(15 * 60))
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, ExecError> {
        let timeout = command.timeout_override().unwrap_or(self.default_timeout);

        let child = Command::new("sh")
            .arg("-c")
            .arg(command.script())
            .envs(command.env_pairs())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(result) => result.context(SpawnSnafu {
                command: command.to_string(),
            })?,
            Err(_) => {
                return Err(ExecError::Timeout {
                    command: command.to_string(),
                    timeout,
                });
            }
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn describe(&self) -> String {
        "local".to_string()
    }
}
