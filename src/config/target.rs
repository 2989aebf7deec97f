// ABOUTME: Deployment target configuration for SSH connections.
// ABOUTME: Parses formats like "host", "user@host", "host:port", "user@host:port".

use serde::Deserialize;
use std::path::PathBuf;

use crate::ssh::SessionConfig;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SshTarget {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    /// Private key file; `~/` is expanded against `$HOME`.
    #[serde(default)]
    pub key: Option<PathBuf>,
    #[serde(default)]
    pub trust_first_connection: bool,
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
}

fn default_port() -> u16 {
    22
}

impl SshTarget {
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("target address cannot be empty".to_string());
        }

        let (user, rest) = match s.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user), rest),
            Some(_) => return Err(format!("empty user in target {:?}", s)),
            None => (None, s),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {}", port))?;
                (host, port)
            }
            None => (rest, 22),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(SshTarget {
            host: host.to_string(),
            port,
            user: user.map(str::to_string),
            key: None,
            trust_first_connection: false,
            known_hosts: None,
        })
    }

    /// Login user: configured, else `$USER`, else `root`.
    pub fn user(&self) -> String {
        self.user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "root".to_string())
    }

    pub fn label(&self) -> String {
        format!("{}@{}:{}", self.user(), self.host, self.port)
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(&self.host, self.user())
            .port(self.port)
            .trust_on_first_use(self.trust_first_connection);
        if let Some(key) = &self.key {
            config = config.key_path(expand_home(key));
        }
        if let Some(known_hosts) = &self.known_hosts {
            config = config.known_hosts_path(expand_home(known_hosts));
        }
        config
    }
}

fn expand_home(path: &std::path::Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_host_port() {
        let target = SshTarget::parse("deploy@vps.example.com:2222").unwrap();
        assert_eq!(target.host, "vps.example.com");
        assert_eq!(target.port, 2222);
        assert_eq!(target.user.as_deref(), Some("deploy"));
        assert!(!target.trust_first_connection);
    }

    #[test]
    fn bare_host_defaults_to_port_22() {
        let target = SshTarget::parse("10.0.0.5").unwrap();
        assert_eq!(target.port, 22);
        assert_eq!(target.user, None);
    }

    #[test]
    fn rejects_bad_ports_and_empty_parts() {
        assert!(SshTarget::parse("host:ssh").is_err());
        assert!(SshTarget::parse("@host").is_err());
        assert!(SshTarget::parse("deploy@:22").is_err());
        assert!(SshTarget::parse("  ").is_err());
    }

    #[test]
    fn expands_home_in_key_path() {
        temp_env::with_var("HOME", Some("/home/ops"), || {
            let mut target = SshTarget::parse("ops@host").unwrap();
            target.key = Some(PathBuf::from("~/.ssh/deploy_ed25519"));
            let config = target.session_config();
            assert_eq!(
                config.key_path,
                Some(PathBuf::from("/home/ops/.ssh/deploy_ed25519"))
            );
        });
    }
}
