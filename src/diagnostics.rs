// ABOUTME: Diagnostics accumulator for non-fatal warnings during a run.
// ABOUTME: Collects warnings that shouldn't fail a command but should be shown to users.

/// Collects non-fatal warnings during a command.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Closing the target connection failed.
    pub fn disconnect(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Disconnect,
            message: message.into(),
        }
    }

    /// A credential is written in plain text in the config file.
    pub fn plaintext_secret(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::PlaintextSecret,
            message: message.into(),
        }
    }

    /// The run finished but left something worth a look (degraded checks, stashes, dry runs).
    pub fn run(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Run,
            message: message.into(),
        }
    }
}

/// Categories of warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Failed to cleanly close the SSH session.
    Disconnect,
    /// Credentials stored in the config file instead of the environment.
    PlaintextSecret,
    /// Reported by the deployment summary.
    Run,
}
