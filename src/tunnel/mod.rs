// ABOUTME: Local port forwarding through the remote host.
// ABOUTME: Forwarders run as detached tasks until the process exits.

mod channel_relay;
mod error;
mod process_relay;
mod registry;

pub use channel_relay::{CHUNK_SIZE, PumpStats, pump};
pub use error::{TunnelError, TunnelErrorKind};
pub use process_relay::{DEFAULT_SSH_PROGRAM, ssh_forward_args};
pub use registry::{ForwarderHandle, ForwarderInfo, TunnelRegistry};

use crate::ssh::Transport;
use channel_relay::ChannelRelay;
use process_relay::ProcessRelay;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

/// How a forwarder moves bytes. Chosen once, when the forwarder is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum RelayMode {
    /// A direct channel on our session per accepted connection.
    #[default]
    #[serde(rename = "channel")]
    ChannelRelay,
    /// An external `ssh -L` process does all the work.
    #[serde(rename = "process")]
    ProcessRelay,
}

/// One local port mapped to one remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSpec {
    pub local_port: u16,
    /// Target host as resolved by the SSH server.
    pub remote_host: String,
    pub remote_port: u16,
    pub relay_mode: RelayMode,
}

impl ForwardSpec {
    pub fn new(
        remote_port: u16,
        local_port: u16,
        remote_host: impl Into<String>,
        relay_mode: RelayMode,
    ) -> Self {
        Self {
            local_port,
            remote_host: remote_host.into(),
            remote_port,
            relay_mode,
        }
    }
}

/// Starts forwarders over one shared transport.
///
/// Forwarders outlive the call that created them and are never awaited; there
/// is no stop operation. They end when the process does.
pub struct TunnelEngine<T: ?Sized> {
    transport: Arc<T>,
    ssh_program: String,
}

impl<T> TunnelEngine<T>
where
    T: Transport + ?Sized + 'static,
{
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            ssh_program: DEFAULT_SSH_PROGRAM.to_string(),
        }
    }

    /// External client used for [`RelayMode::ProcessRelay`].
    pub fn ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    /// Where a forward points when no host is given: the session host for
    /// channel relays, the server's own loopback for process relays.
    pub fn default_remote_host(&self, relay_mode: RelayMode) -> String {
        match relay_mode {
            RelayMode::ChannelRelay => self.transport.identity().host.clone(),
            RelayMode::ProcessRelay => "localhost".to_string(),
        }
    }

    /// Forward `local_port` to `remote_port` on the default remote host.
    ///
    /// Returns once the forwarder is listening (or the client process is
    /// launched). Connection-level failures after that are only logged.
    pub async fn add_forward(
        &self,
        registry: &TunnelRegistry,
        remote_port: u16,
        local_port: u16,
        relay_mode: RelayMode,
    ) -> Result<ForwarderInfo, TunnelError> {
        let spec = ForwardSpec::new(
            remote_port,
            local_port,
            self.default_remote_host(relay_mode),
            relay_mode,
        );
        self.add_forward_spec(registry, spec).await
    }

    pub async fn add_forward_spec(
        &self,
        registry: &TunnelRegistry,
        spec: ForwardSpec,
    ) -> Result<ForwarderInfo, TunnelError> {
        let handle = match spec.relay_mode {
            RelayMode::ChannelRelay => {
                let relay = ChannelRelay::bind(
                    Arc::clone(&self.transport),
                    spec.local_port,
                    spec.remote_host.clone(),
                    spec.remote_port,
                )
                .await?;
                let local_addr = relay.local_addr();
                tracing::info!(
                    "Forwarding {} -> {}:{} over SSH channels",
                    local_addr,
                    spec.remote_host,
                    spec.remote_port
                );
                ForwarderHandle::new(spec, local_addr, tokio::spawn(relay.run()))
            }
            RelayMode::ProcessRelay => {
                let relay = ProcessRelay::launch(
                    &self.ssh_program,
                    self.transport.identity(),
                    spec.local_port,
                    &spec.remote_host,
                    spec.remote_port,
                )?;
                let local_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, spec.local_port));
                tracing::info!(
                    "Forwarding {} -> {}:{} via {}",
                    local_addr,
                    spec.remote_host,
                    spec.remote_port,
                    self.ssh_program
                );
                ForwarderHandle::new(spec, local_addr, tokio::spawn(relay.run()))
            }
        };

        Ok(registry.register(handle))
    }
}
