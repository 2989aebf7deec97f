// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};

/// Serialize a duration as whole milliseconds.
pub fn duration_ms<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
}

/// Serialize an optional duration as whole milliseconds.
pub fn duration_ms_opt<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(d) => duration_ms(d, serializer),
        None => serializer.serialize_none(),
    }
}

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration_secs(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a warning (JSON mode emits a warning event).
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Warning: {message}"),
            OutputMode::Json => self.emit_err("warning", message),
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => {
                println!("{message}");
            }
            OutputMode::Json => self.emit_out("success", message),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => self.emit_err("error", message),
        }
    }

    /// Print a structured result: rendered text, or one JSON document.
    pub fn report<T: Serialize>(&self, rendered: &str, value: &T) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => print!("{rendered}"),
            OutputMode::Json => match serde_json::to_string(&ReportEvent {
                event: "report",
                report: value,
            }) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!("failed to serialize report: {}", e),
            },
        }
    }

    fn event<'a>(&self, event: &'a str, message: &'a str) -> JsonEvent<'a> {
        JsonEvent {
            event,
            message,
            duration_secs: self.duration_secs(),
        }
    }

    fn emit_out(&self, event: &str, message: &str) {
        if let Ok(json) = serde_json::to_string(&self.event(event, message)) {
            println!("{json}");
        }
    }

    fn emit_err(&self, event: &str, message: &str) {
        if let Ok(json) = serde_json::to_string(&self.event(event, message)) {
            eprintln!("{json}");
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct ReportEvent<'a, T> {
    event: &'a str,
    report: &'a T,
}
