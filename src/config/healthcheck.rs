// ABOUTME: Health check configuration: HTTP endpoint or log-pattern probes.
// ABOUTME: Converted into health::HealthCheck values after validation.

use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

use crate::health::{CheckKind, HealthCheck, HttpProbe, LogPattern, LogProbe};
use crate::types::ServiceName;

/// Largest log window a probe may scan.
pub const MAX_LOG_WINDOW: u32 = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthcheckConfig {
    pub name: String,

    #[serde(default)]
    pub optional: bool,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_backoff", with = "humantime_serde")]
    pub backoff: Duration,

    #[serde(default)]
    pub http: Option<HttpCheckConfig>,

    #[serde(default)]
    pub log: Option<LogCheckConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpCheckConfig {
    pub url: String,
    #[serde(default = "default_expect_status")]
    pub expect_status: u16,
    #[serde(default)]
    pub expect_body: Option<String>,
    #[serde(default)]
    pub via_target: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogCheckConfig {
    pub service: String,
    pub pattern: String,
    #[serde(default)]
    pub regex: bool,
    #[serde(default = "default_window")]
    pub window: u32,
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_retries() -> u32 {
    3
}

fn default_backoff() -> Duration {
    Duration::from_secs(5)
}

fn default_expect_status() -> u16 {
    200
}

fn default_window() -> u32 {
    50
}

impl HealthcheckConfig {
    pub fn to_check(&self) -> Result<HealthCheck, String> {
        let kind = match (&self.http, &self.log) {
            (Some(http), None) => CheckKind::Http(http.to_probe()?),
            (None, Some(log)) => CheckKind::Log(log.to_probe()?),
            (Some(_), Some(_)) => {
                return Err(format!(
                    "healthcheck {} sets both http and log; pick one",
                    self.name
                ));
            }
            (None, None) => {
                return Err(format!("healthcheck {} needs an http or log probe", self.name));
            }
        };

        if self.retries == 0 {
            return Err(format!("healthcheck {}: retries must be at least 1", self.name));
        }
        if self.timeout.is_zero() {
            return Err(format!("healthcheck {}: timeout must be positive", self.name));
        }

        Ok(HealthCheck {
            name: self.name.clone(),
            kind,
            timeout: self.timeout,
            retries: self.retries,
            backoff: self.backoff,
            optional: self.optional,
        })
    }
}

impl HttpCheckConfig {
    fn to_probe(&self) -> Result<HttpProbe, String> {
        let uri: hyper::Uri = self
            .url
            .parse()
            .map_err(|e| format!("invalid healthcheck url {}: {}", self.url, e))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some("https") if self.via_target => {}
            Some("https") => {
                return Err(format!(
                    "{}: https probes need via_target: true (curl on the target)",
                    self.url
                ));
            }
            _ => return Err(format!("{}: url must start with http://", self.url)),
        }
        if !(100..=599).contains(&self.expect_status) {
            return Err(format!("invalid expect_status {}", self.expect_status));
        }
        Ok(HttpProbe {
            url: self.url.clone(),
            expect_status: self.expect_status,
            expect_body: self.expect_body.clone(),
            via_target: self.via_target,
        })
    }
}

impl LogCheckConfig {
    fn to_probe(&self) -> Result<LogProbe, String> {
        let service = ServiceName::new(&self.service).map_err(|e| e.to_string())?;
        if self.pattern.is_empty() {
            return Err(format!("log pattern for {} must not be empty", service));
        }
        let pattern = if self.regex {
            let re = Regex::new(&self.pattern)
                .map_err(|e| format!("invalid log regex {:?}: {}", self.pattern, e))?;
            LogPattern::Regex(re)
        } else {
            LogPattern::Substring(self.pattern.clone())
        };
        Ok(LogProbe {
            service,
            pattern,
            window: self.window.clamp(1, MAX_LOG_WINDOW),
        })
    }
}
