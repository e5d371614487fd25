// ABOUTME: Capability traits the execution and tunnel engines consume.
// ABOUTME: Implemented by the russh-backed Session and by in-memory fakes in tests.

use super::error::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};

/// Who we are connected as, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub key_path: Option<PathBuf>,
}

/// Byte stream over a direct channel to a remote endpoint.
pub trait TunnelIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> TunnelIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type TunnelStream = Box<dyn TunnelIo>;

/// A channel running one remote command.
#[async_trait]
pub trait CommandChannel: Send {
    /// Next stdout line including its terminator. An empty vector means end of stream.
    async fn read_stdout_line(&mut self) -> Result<Vec<u8>>;

    /// Block until the remote command reports its exit status.
    async fn wait_exit_status(&mut self) -> Result<u32>;

    /// Remaining stderr, split into lines.
    async fn read_stderr_lines(&mut self) -> Result<Vec<Vec<u8>>>;

    /// Give up ownership without consuming output; the command keeps running.
    fn detach(self: Box<Self>) {}
}

/// An authenticated connection able to open channels.
///
/// Opening channels takes `&self` and must be safe to call from many tasks at once.
#[async_trait]
pub trait Transport: Send + Sync {
    fn identity(&self) -> &Identity;

    async fn open_command_channel(
        &self,
        command: &str,
        want_pty: bool,
    ) -> Result<Box<dyn CommandChannel>>;

    async fn open_direct_channel(
        &self,
        remote_host: &str,
        remote_port: u16,
        local_peer: SocketAddr,
    ) -> Result<TunnelStream>;
}
