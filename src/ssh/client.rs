// ABOUTME: SSH session management using russh.
// ABOUTME: Handles connection, host key checks, authentication, and command execution.

use super::error::{Error, Result};
use russh::client::{self, Config, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;

/// Configuration for establishing an SSH session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Private key file. If None, the SSH agent is tried, then `~/.ssh/id_*`.
    pub key_path: Option<PathBuf>,
    /// Accept and record unknown host keys (Trust On First Use).
    pub trust_on_first_use: bool,
    /// known_hosts file; None uses `~/.ssh/known_hosts`.
    pub known_hosts_path: Option<PathBuf>,
    /// Give up if the TCP/SSH handshake takes longer than this.
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            key_path: None,
            trust_on_first_use: false,
            known_hosts_path: None,
            connect_timeout: Duration::from_secs(20),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn trust_on_first_use(mut self, tofu: bool) -> Self {
        self.trust_on_first_use = tofu;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn label(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Output from a remote command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Host key verification against known_hosts.
pub(crate) struct HostKeyCheck {
    host: String,
    port: u16,
    trust_on_first_use: bool,
    known_hosts_path: Option<PathBuf>,
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let known = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match known {
            Ok(true) => Ok(true),
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::error!(
                    "host key for {}:{} changed; refusing to connect",
                    self.host,
                    self.port
                );
                Ok(false)
            }
            Ok(false) | Err(_) if self.trust_on_first_use => {
                tracing::warn!(
                    "Trust-On-First-Use: accepting unknown host key for {}:{}",
                    self.host,
                    self.port
                );
                let learned = match &self.known_hosts_path {
                    Some(path) => {
                        learn_known_hosts_path(&self.host, self.port, server_public_key, path)
                    }
                    None => learn_known_hosts(&self.host, self.port, server_public_key),
                };
                if let Err(e) = learned {
                    tracing::warn!("failed to save host key to known_hosts: {}", e);
                }
                Ok(true)
            }
            Ok(false) | Err(_) => Ok(false),
        }
    }
}

enum AuthMethod {
    Agent(AgentClient<UnixStream>),
    KeyFile(Arc<ssh_key::PrivateKey>),
}

/// An established SSH session.
pub struct Session {
    config: SessionConfig,
    handle: Handle<HostKeyCheck>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connect and authenticate.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let auth_method = Self::resolve_auth_method(&config).await?;

        let russh_config = Config {
            inactivity_timeout: Some(Duration::from_secs(60)),
            keepalive_interval: Some(Duration::from_secs(15)),
            ..Default::default()
        };

        let checker = HostKeyCheck {
            host: config.host.clone(),
            port: config.port,
            trust_on_first_use: config.trust_on_first_use,
            known_hosts_path: config.known_hosts_path.clone(),
        };

        let connecting = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            checker,
        );

        let mut handle = match tokio::time::timeout(config.connect_timeout, connecting).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(russh::Error::UnknownKey)) => return Err(Error::UntrustedHost(config.label())),
            Ok(Err(e)) => return Err(Error::Connection(format!("{}: {}", config.label(), e))),
            Err(_) => {
                return Err(Error::Connection(format!(
                    "{}: timed out after {:?}",
                    config.label(),
                    config.connect_timeout
                )));
            }
        };

        if !Self::authenticate(&mut handle, &config, auth_method).await? {
            return Err(Error::AuthenticationFailed(config.user.clone()));
        }

        tracing::debug!("SSH session established to {}", config.label());
        Ok(Self { config, handle })
    }

    pub fn label(&self) -> String {
        self.config.label()
    }

    async fn resolve_auth_method(config: &SessionConfig) -> Result<AuthMethod> {
        if let Some(key_path) = &config.key_path {
            let key = load_secret_key(key_path, None).map_err(|e| Error::KeyLoadFailed {
                path: key_path.clone(),
                reason: e.to_string(),
            })?;
            return Ok(AuthMethod::KeyFile(Arc::new(key)));
        }

        if let Ok(agent) = AgentClient::connect_env().await {
            return Ok(AuthMethod::Agent(agent));
        }

        let home = std::env::var("HOME").map_err(|_| {
            Error::AgentUnavailable("SSH agent not available and HOME not set".to_string())
        })?;

        for name in ["id_ed25519", "id_rsa", "id_ecdsa"] {
            let key_path = format!("{}/.ssh/{}", home, name);
            if let Ok(key) = load_secret_key(&key_path, None) {
                return Ok(AuthMethod::KeyFile(Arc::new(key)));
            }
        }

        Err(Error::AgentUnavailable(
            "SSH agent not available and no default keys found".to_string(),
        ))
    }

    async fn authenticate(
        handle: &mut Handle<HostKeyCheck>,
        config: &SessionConfig,
        auth_method: AuthMethod,
    ) -> Result<bool> {
        match auth_method {
            AuthMethod::Agent(mut agent) => {
                let keys = agent.request_identities().await.map_err(|e| {
                    Error::AgentUnavailable(format!("failed to list agent keys: {}", e))
                })?;

                for key in keys {
                    match handle
                        .authenticate_publickey_with(&config.user, key, None, &mut agent)
                        .await
                    {
                        Ok(result) if result.success() => return Ok(true),
                        _ => continue,
                    }
                }
                Ok(false)
            }
            AuthMethod::KeyFile(key) => {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                let result = handle
                    .authenticate_publickey(&config.user, PrivateKeyWithHashAlg::new(key, hash_alg))
                    .await?;
                Ok(result.success())
            }
        }
    }

    /// Execute a command with a timeout. Dropping the future closes the channel.
    pub async fn exec_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        match tokio::time::timeout(timeout, self.exec_inner(command)).await {
            Ok(result) => result,
            Err(_) => Err(Error::CommandTimeout(timeout)),
        }
    }

    async fn exec_inner(&self, command: &str) -> Result<CommandOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to open channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::CommandFailed(format!("failed to exec command: {}", e)))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut got_eof = false;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(exit_status);
                    if got_eof {
                        break;
                    }
                }
                ChannelMsg::Eof => {
                    got_eof = true;
                    if exit_code.is_some() {
                        break;
                    }
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        let exit_code = exit_code.ok_or(Error::ChannelClosed)?;

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    /// Disconnect the session.
    pub async fn disconnect(self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}
