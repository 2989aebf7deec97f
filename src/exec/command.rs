// ABOUTME: Shell command construction, quoting, and captured output.
// ABOUTME: Secret environment values are carried separately and never rendered in logs.

use std::fmt;
use std::time::Duration;

/// Quote a word for POSIX `sh` using single quotes.
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ','))
    {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', "'\\''"))
}

/// Keep the last `n` lines of `text`.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[derive(Debug, Clone)]
struct EnvVar {
    name: String,
    value: String,
    secret: bool,
}

/// A single shell line to run on a target, with optional working directory and environment.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    line: String,
    workdir: Option<String>,
    env: Vec<EnvVar>,
    timeout: Option<Duration>,
}

impl ShellCommand {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            workdir: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn workdir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvVar {
            name: name.into(),
            value: value.into(),
            secret: false,
        });
        self
    }

    /// Add an environment variable whose value is redacted from display and audit output.
    pub fn secret_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvVar {
            name: name.into(),
            value: value.into(),
            secret: true,
        });
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    /// The script to hand to `sh -c`: changes directory first when a workdir is set.
    pub fn script(&self) -> String {
        match &self.workdir {
            Some(dir) => format!("cd {} && {}", shell_quote(dir), self.line),
            None => self.line.clone(),
        }
    }

    /// Environment pairs for executors that set the process environment directly.
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().map(|v| (v.name.as_str(), v.value.as_str()))
    }

    /// Script with environment exported inline, for remote shells.
    pub fn render_inline(&self) -> String {
        let exports: String = self
            .env
            .iter()
            .map(|v| format!("export {}={}; ", v.name, shell_quote(&v.value)))
            .collect();
        format!("{}{}", exports, self.script())
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for var in &self.env {
            if var.secret {
                write!(f, "{}=*** ", var.name)?;
            } else {
                write!(f, "{}={} ", var.name, shell_quote(&var.value))?;
            }
        }
        if let Some(dir) = &self.workdir {
            write!(f, "[{}] ", dir)?;
        }
        write!(f, "{}", self.line)
    }
}

/// Output from a command run through an executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code of the command; -1 when it was killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, _) => self.stderr.clone(),
            (_, true) => self.stdout.clone(),
            _ => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }

    pub fn tail(&self, n: usize) -> String {
        tail_lines(&self.combined(), n)
    }
}
