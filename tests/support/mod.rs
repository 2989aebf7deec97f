// ABOUTME: Test support utilities.
// ABOUTME: Provides a scripted executor that records commands and replays canned output.

use async_trait::async_trait;
use deckhand::exec::{CommandOutput, ExecError, Executor, ShellCommand};
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("deckhand=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

struct Rule {
    needle: String,
    /// Replayed in order; the last one repeats.
    responses: VecDeque<CommandOutput>,
}

/// A fake target. Commands matching a rule get its canned output; everything else succeeds
/// with empty output. The most recently added matching rule wins, so callers can override
/// a shared setup.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    log: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command containing `needle` with `output`.
    pub fn on(self, needle: &str, output: CommandOutput) -> Self {
        self.on_sequence(needle, vec![output])
    }

    /// Answer successive commands containing `needle` with `outputs` in order.
    pub fn on_sequence(self, needle: &str, outputs: Vec<CommandOutput>) -> Self {
        self.rules.lock().push(Rule {
            needle: needle.to_string(),
            responses: outputs.into(),
        });
        self
    }

    /// Every command line run so far, with workdir and redacted environment.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Index of the first command containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.log.lock().iter().position(|c| c.contains(needle))
    }

    pub fn count(&self, needle: &str) -> usize {
        self.log.lock().iter().filter(|c| c.contains(needle)).count()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.position(needle).is_some()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, ExecError> {
        let rendered = command.to_string();
        self.log.lock().push(rendered.clone());

        let mut rules = self.rules.lock();
        let Some(rule) = rules.iter_mut().rev().find(|r| rendered.contains(&r.needle)) else {
            return Ok(CommandOutput::ok(""));
        };
        let output = if rule.responses.len() > 1 {
            rule.responses.pop_front().unwrap_or_default()
        } else {
            rule.responses.front().cloned().unwrap_or_default()
        };
        Ok(output)
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Forty hex characters, as printed by `git rev-parse HEAD`.
#[allow(dead_code)]
pub const COMMIT: &str = "3f9c2a71b0d84e6a9c1f5e2d7b8a4c6e0f1d2a3b";

/// A fake compose host that tracks which services are running. `down`, `stop`, and
/// `up` change that set, `ps` reports it, and `exec` into a stopped service fails the
/// way compose does. Every other command goes to the wrapped script.
#[allow(dead_code)]
pub struct ComposeHost {
    services: Vec<String>,
    running: Mutex<BTreeSet<String>>,
    script: ScriptedExecutor,
}

#[allow(dead_code)]
impl ComposeHost {
    /// All of `services` start out running.
    pub fn new(services: &[&str], script: ScriptedExecutor) -> Self {
        Self {
            services: services.iter().map(|s| s.to_string()).collect(),
            running: Mutex::new(services.iter().map(|s| s.to_string()).collect()),
            script,
        }
    }

    pub fn script(&self) -> &ScriptedExecutor {
        &self.script
    }

    pub fn is_running(&self, service: &str) -> bool {
        self.running.lock().contains(service)
    }

    /// Apply the compose subcommand in `line`; `Some` when it was handled here.
    fn compose(&self, args: &str) -> Option<CommandOutput> {
        let words: Vec<&str> = args.split_whitespace().collect();
        let names = |skip: usize| -> Vec<String> {
            words[skip..]
                .iter()
                .filter(|w| !w.starts_with('-'))
                .map(|w| w.to_string())
                .collect()
        };
        let mut running = self.running.lock();
        match words.first().copied()? {
            "down" => running.clear(),
            "stop" => {
                for name in names(1) {
                    running.remove(&name);
                }
            }
            "up" => {
                let named = names(1);
                if named.is_empty() {
                    running.extend(self.services.iter().cloned());
                } else {
                    running.extend(named);
                }
            }
            "ps" if words.contains(&"running") => {
                let listed: String = running.iter().map(|s| format!("{s}\n")).collect();
                return Some(CommandOutput::ok(listed));
            }
            "exec" => {
                let service = words[1..].iter().find(|w| !w.starts_with('-') && **w != "PGPASSWORD")?;
                if !running.contains(*service) {
                    return Some(CommandOutput::failed(
                        1,
                        format!("service \"{service}\" is not running"),
                    ));
                }
                return None;
            }
            _ => return None,
        }
        Some(CommandOutput::ok(""))
    }
}

#[async_trait]
impl Executor for ComposeHost {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput, ExecError> {
        if let Some((_, rest)) = command.line().split_once(" -f ")
            && let Some((_, args)) = rest.split_once(' ')
            && let Some(output) = self.compose(args)
        {
            self.script.log.lock().push(command.to_string());
            return Ok(output);
        }
        self.script.run(command).await
    }

    fn describe(&self) -> String {
        "compose host".to_string()
    }
}
