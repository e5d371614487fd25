// ABOUTME: SSH client module for remote server connections.
// ABOUTME: russh-backed Session plus the channel traits the engines are written against.

mod channel;
mod client;
mod error;
mod transport;

pub use client::{Session, SessionConfig};
pub use error::{Error, Result};
pub use transport::{CommandChannel, Identity, Transport, TunnelIo, TunnelStream};
