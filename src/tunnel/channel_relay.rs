// ABOUTME: Forwarding a local TCP port through direct SSH channels.
// ABOUTME: One accept loop per forwarder, one pump task per accepted connection.

use super::error::{BindSnafu, TunnelError};
use crate::ssh::{Error, Transport};
use snafu::ResultExt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Bytes moved per read in the pump loop.
pub const CHUNK_SIZE: usize = 1024;

/// Pause after a failed accept.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound listener relaying to `remote_host:remote_port`.
pub(crate) struct ChannelRelay<T: ?Sized> {
    listener: TcpListener,
    local_addr: SocketAddr,
    transport: Arc<T>,
    remote_host: String,
    remote_port: u16,
}

impl<T> ChannelRelay<T>
where
    T: Transport + ?Sized + 'static,
{
    /// Bind the local port on all interfaces. Port 0 picks a free port.
    pub(crate) async fn bind(
        transport: Arc<T>,
        local_port: u16,
        remote_host: String,
        remote_port: u16,
    ) -> Result<Self, TunnelError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, local_port))
            .await
            .context(BindSnafu { port: local_port })?;
        let local_addr = listener
            .local_addr()
            .context(BindSnafu { port: local_port })?;
        Ok(Self {
            listener,
            local_addr,
            transport,
            remote_host,
            remote_port,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept forever. Payload bytes never pass through this loop.
    pub(crate) async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let transport = Arc::clone(&self.transport);
                    let remote_host = self.remote_host.clone();
                    let remote_port = self.remote_port;
                    tokio::spawn(async move {
                        serve_connection(stream, peer, transport.as_ref(), &remote_host, remote_port)
                            .await;
                    });
                }
                Err(e) => {
                    tracing::warn!("Accept error on forwarded port: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

/// Open the remote end for one accepted socket and pump until either side closes.
async fn serve_connection<T>(
    local: TcpStream,
    peer: SocketAddr,
    transport: &T,
    remote_host: &str,
    remote_port: u16,
) where
    T: Transport + ?Sized,
{
    let remote = match transport
        .open_direct_channel(remote_host, remote_port, peer)
        .await
    {
        Ok(remote) => remote,
        Err(Error::ChannelRejected { reason, .. }) => {
            tracing::warn!(
                "Incoming request from {} to {}:{} was rejected by the SSH server: {}",
                peer,
                remote_host,
                remote_port,
                reason
            );
            return;
        }
        Err(e) => {
            tracing::warn!(
                "Incoming request from {} to {}:{} failed: {}",
                peer,
                remote_host,
                remote_port,
                e
            );
            return;
        }
    };

    let path = route(peer, remote_host, remote_port);
    tracing::info!("Tunnel open {}", path);
    let stats = pump(local, remote).await;
    tracing::info!(
        "Tunnel closed {} ({} bytes sent, {} bytes received)",
        path,
        stats.to_remote,
        stats.to_local
    );
}

/// `peer -> host:port`, as shown in tunnel open and close lines.
fn route(peer: SocketAddr, remote_host: &str, remote_port: u16) -> String {
    format!("{} -> {}:{}", peer, remote_host, remote_port)
}

/// Byte counts for one finished connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub to_remote: u64,
    pub to_local: u64,
}

/// Relay bytes both ways until either side reads zero bytes or errors.
///
/// A half-close on either side ends the whole connection. Both ends are shut
/// down exactly once, when the loop exits, and dropped with the pump.
pub async fn pump<L, R>(mut local: L, mut remote: R) -> PumpStats
where
    L: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let mut stats = PumpStats::default();
    let mut local_buf = [0u8; CHUNK_SIZE];
    let mut remote_buf = [0u8; CHUNK_SIZE];

    loop {
        tokio::select! {
            r = local.read(&mut local_buf) => {
                match r {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Err(e) = remote.write_all(&local_buf[..n]).await {
                            tracing::debug!("Channel write error: {}", e);
                            break;
                        }
                        stats.to_remote += n as u64;
                    }
                    Err(e) => {
                        tracing::debug!("Local socket read error: {}", e);
                        break;
                    }
                }
            }

            r = remote.read(&mut remote_buf) => {
                match r {
                    Ok(0) => break,
                    Ok(n) => {
                        if let Err(e) = local.write_all(&remote_buf[..n]).await {
                            tracing::debug!("Local socket write error: {}", e);
                            break;
                        }
                        stats.to_local += n as u64;
                    }
                    Err(e) => {
                        tracing::debug!("Channel read error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = remote.shutdown().await {
        tracing::debug!("Channel close error: {}", e);
    }
    if let Err(e) = local.shutdown().await {
        tracing::debug!("Local socket close error: {}", e);
    }

    stats
}
