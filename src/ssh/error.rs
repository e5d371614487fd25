// ABOUTME: SSH-specific error types.
// ABOUTME: Covers connection, authentication, host key and channel setup failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: no valid credentials")]
    AuthenticationFailed,

    #[error("SSH agent not available: {0}")]
    AgentUnavailable(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("failed to open command channel: {0}")]
    CommandChannel(String),

    #[error("channel to {host}:{port} rejected: {reason}")]
    ChannelRejected {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures that abort a whole session rather than one channel.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationFailed
                | Error::AgentUnavailable(_)
                | Error::KeyLoadFailed { .. }
                | Error::Key(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
