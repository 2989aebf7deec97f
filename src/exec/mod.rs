// ABOUTME: Remote executor: runs shell command sequences locally or over SSH.
// ABOUTME: Every step of a deployment goes through the Executor trait so it can be faked in tests.

mod audit;
mod command;
mod error;
mod local;
mod remote;
mod target;

pub use audit::{AuditEntry, AuditTrail, Audited};
pub use command::{CommandOutput, ShellCommand, shell_quote, tail_lines};
pub use error::{ExecError, ExecErrorKind};
pub use local::LocalExecutor;
pub use remote::SshExecutor;
pub use target::Target;

use async_trait::async_trait;

/// Number of output lines kept when a command failure is reported.
pub const ERROR_TAIL_LINES: usize = 30;

/// Something that can run shell lines and report their exit status.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a command and return its output regardless of exit status.
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, ExecError>;

    /// Human-readable name of where commands run (`local` or `user@host:port`).
    fn describe(&self) -> String;

    /// Run a command, treating a non-zero exit status as an error.
    async fn run_checked(&self, command: &ShellCommand) -> Result<CommandOutput, ExecError> {
        let output = self.run(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ExecError::Command {
                command: command.to_string(),
                exit_code: output.exit_code,
                tail: output.tail(ERROR_TAIL_LINES),
            })
        }
    }
}
