// ABOUTME: Builds docker-compose command lines for the configured project directory.
// ABOUTME: Shared by the image builder, service controller, log probes, and data patcher.

use crate::exec::{ShellCommand, shell_quote};
use crate::types::ServiceName;

/// The compose CLI as invoked on the target, e.g. `docker compose -f docker-compose.yml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCli {
    program: String,
    file: String,
    workdir: String,
}

impl ComposeCli {
    pub fn new(
        program: impl Into<String>,
        file: impl Into<String>,
        workdir: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            file: file.into(),
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    /// A compose subcommand run from the project directory.
    pub fn command(&self, args: &str) -> ShellCommand {
        ShellCommand::new(format!(
            "{} -f {} {}",
            self.program,
            shell_quote(&self.file),
            args
        ))
        .workdir(self.workdir.clone())
    }

    /// The program prefix alone, for remediation hints.
    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Space-separated service list for a compose argument tail.
pub fn service_args(services: &[ServiceName]) -> String {
    services
        .iter()
        .map(ServiceName::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
