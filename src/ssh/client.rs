// ABOUTME: SSH session management using russh.
// ABOUTME: Handles connection, authentication, and opening command and direct channels.

use super::channel::RusshCommandChannel;
use super::error::{Error, Result};
use super::transport::{CommandChannel, Identity, Transport, TunnelStream};
use crate::exec::{self, CommandRequest, CommandResult};
use crate::output::{Output, OutputMode};
use async_trait::async_trait;
use russh::Disconnect;
use russh::client::{self, Config, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;

/// Terminal type requested for command channels.
const PTY_TERM: &str = "xterm";
const PTY_COLS: u32 = 80;
const PTY_ROWS: u32 = 24;

/// Configuration for establishing an SSH session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote host to connect to.
    pub host: String,
    /// SSH port (default: 22).
    pub port: u16,
    /// Username for authentication.
    pub user: String,
    /// Optional path to private key file.
    /// If None, will try SSH agent then default key locations.
    pub key_path: Option<PathBuf>,
    /// Password tried after public key authentication fails.
    pub password: Option<String>,
    /// Whether to accept unknown hosts (Trust On First Use).
    /// If false, connection to unknown hosts will fail.
    pub trust_on_first_use: bool,
    /// Optional path to known_hosts file.
    /// If None, uses the default ~/.ssh/known_hosts.
    pub known_hosts_path: Option<PathBuf>,
    /// Timeout for establishing the TCP connection and handshake (default: 10 seconds).
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            user: user.into(),
            key_path: None,
            password: None,
            trust_on_first_use: false,
            known_hosts_path: None,
            connect_timeout: Duration::from_secs(10),
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

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
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

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn identity(&self) -> Identity {
        Identity {
            host: self.host.clone(),
            user: self.user.clone(),
            port: self.port,
            key_path: self.key_path.clone(),
        }
    }
}

/// SSH client handler for russh.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    trust_on_first_use: bool,
    known_hosts_path: Option<PathBuf>,
}

impl SshHandler {
    fn new(
        host: String,
        port: u16,
        trust_on_first_use: bool,
        known_hosts_path: Option<PathBuf>,
    ) -> Self {
        Self {
            host,
            port,
            trust_on_first_use,
            known_hosts_path,
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let check_result = match &self.known_hosts_path {
            Some(path) => check_known_hosts_path(&self.host, self.port, server_public_key, path),
            None => check_known_hosts(&self.host, self.port, server_public_key),
        };

        match check_result {
            Ok(true) => Ok(true),
            Ok(false) => {
                if !self.trust_on_first_use {
                    return Ok(false);
                }
                tracing::warn!(
                    "Trust-On-First-Use: accepting unknown host key for {}:{}",
                    self.host,
                    self.port
                );
                let learn_result = match &self.known_hosts_path {
                    Some(path) => {
                        learn_known_hosts_path(&self.host, self.port, server_public_key, path)
                    }
                    None => learn_known_hosts(&self.host, self.port, server_public_key),
                };
                if let Err(e) = learn_result {
                    tracing::warn!("Failed to save host key to known_hosts: {}", e);
                }
                Ok(true)
            }
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::warn!("Host key for {}:{} changed, refusing", self.host, self.port);
                Ok(false)
            }
            // Unreadable known_hosts: treat as unknown host
            Err(_) => Ok(self.trust_on_first_use),
        }
    }
}

/// Authentication method resolved from config.
enum AuthMethod {
    Agent(AgentClient<UnixStream>),
    KeyFile(Arc<ssh_key::PrivateKey>),
}

/// An established SSH session.
///
/// Wrap it in an `Arc` to share it between command executions and forwarders.
pub struct Session {
    identity: Identity,
    handle: Arc<Handle<SshHandler>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("handle", &"<russh::Handle>")
            .finish()
    }
}

impl Session {
    /// Connect to the remote host and authenticate.
    ///
    /// There is no reconnect: a failed attempt is returned and the caller decides
    /// whether to try again.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        let auth_method = match Self::resolve_auth_method(&config).await {
            Ok(method) => Some(method),
            Err(e) if config.password.is_some() => {
                tracing::debug!("No public key available ({}), will use password", e);
                None
            }
            Err(e) => return Err(e),
        };

        let russh_config = Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let handler = SshHandler::new(
            config.host.clone(),
            config.port,
            config.trust_on_first_use,
            config.known_hosts_path.clone(),
        );

        let connecting = client::connect(
            Arc::new(russh_config),
            (config.host.as_str(), config.port),
            handler,
        );
        let mut session = match tokio::time::timeout(config.connect_timeout, connecting).await {
            Ok(result) => result.map_err(|e| {
                if e.to_string().contains("Connection refused") {
                    Error::Connection(format!(
                        "connection refused to {}:{}",
                        config.host, config.port
                    ))
                } else {
                    Error::Connection(e.to_string())
                }
            })?,
            Err(_) => {
                return Err(Error::Connection(format!(
                    "timed out connecting to {}:{} after {:?}",
                    config.host, config.port, config.connect_timeout
                )));
            }
        };

        let mut authenticated = match auth_method {
            Some(method) => Self::authenticate(&mut session, &config, method).await?,
            None => false,
        };
        if !authenticated {
            if let Some(password) = &config.password {
                authenticated = session
                    .authenticate_password(&config.user, password)
                    .await
                    .map_err(Error::Protocol)?
                    .success();
            }
        }
        if !authenticated {
            return Err(Error::AuthenticationFailed);
        }

        tracing::info!(
            "Connected to {}@{}:{}",
            config.user,
            config.host,
            config.port
        );

        Ok(Self {
            identity: config.identity(),
            handle: Arc::new(session),
        })
    }

    /// Resolve which authentication method to use.
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

        let default_keys = [
            format!("{}/.ssh/id_ed25519", home),
            format!("{}/.ssh/id_rsa", home),
            format!("{}/.ssh/id_ecdsa", home),
        ];

        for key_path in &default_keys {
            if let Ok(key) = load_secret_key(key_path, None) {
                return Ok(AuthMethod::KeyFile(Arc::new(key)));
            }
        }

        Err(Error::AgentUnavailable(
            "SSH agent not available and no default keys found".to_string(),
        ))
    }

    async fn authenticate(
        session: &mut Handle<SshHandler>,
        config: &SessionConfig,
        auth_method: AuthMethod,
    ) -> Result<bool> {
        match auth_method {
            AuthMethod::Agent(mut agent) => {
                let keys = agent.request_identities().await.map_err(|e| {
                    Error::AgentUnavailable(format!("failed to list agent keys: {}", e))
                })?;

                for key in &keys {
                    match session
                        .authenticate_publickey_with(&config.user, key.clone(), None, &mut agent)
                        .await
                    {
                        Ok(result) if result.success() => return Ok(true),
                        _ => continue,
                    }
                }
                Ok(false)
            }
            AuthMethod::KeyFile(key) => {
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(Error::Protocol)?
                    .flatten();

                let result = session
                    .authenticate_publickey(&config.user, PrivateKeyWithHashAlg::new(key, hash_alg))
                    .await
                    .map_err(Error::Protocol)?;

                Ok(result.success())
            }
        }
    }

    /// Run a command, echoing output to the console.
    pub async fn execute(&self, request: &CommandRequest) -> Result<CommandResult> {
        let mut output = Output::new(OutputMode::Normal);
        exec::execute(self, request, &mut output).await
    }

    /// Disconnect the session. Channels still open are torn down with it.
    pub async fn disconnect(&self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)?;
        Ok(())
    }
}

#[async_trait]
impl Transport for Session {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn open_command_channel(
        &self,
        command: &str,
        want_pty: bool,
    ) -> Result<Box<dyn CommandChannel>> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::CommandChannel(format!("failed to open channel: {}", e)))?;

        if want_pty {
            channel
                .request_pty(false, PTY_TERM, PTY_COLS, PTY_ROWS, 0, 0, &[])
                .await
                .map_err(|e| Error::CommandChannel(format!("failed to request pty: {}", e)))?;
        }

        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::CommandChannel(format!("failed to exec command: {}", e)))?;

        Ok(Box::new(RusshCommandChannel::new(channel)))
    }

    async fn open_direct_channel(
        &self,
        remote_host: &str,
        remote_port: u16,
        local_peer: SocketAddr,
    ) -> Result<TunnelStream> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(
                remote_host,
                remote_port.into(),
                local_peer.ip().to_string(),
                local_peer.port().into(),
            )
            .await
            .map_err(|e| match e {
                russh::Error::ChannelOpenFailure(reason) => Error::ChannelRejected {
                    host: remote_host.to_string(),
                    port: remote_port,
                    reason: format!("{:?}", reason),
                },
                other => Error::Connection(other.to_string()),
            })?;

        Ok(Box::new(channel.into_stream()))
    }
}
