// ABOUTME: Tunnel setup error types with SNAFU pattern.
// ABOUTME: Only setup can fail; per-connection failures are logged, never returned.

use snafu::Snafu;

/// Failure to start a forwarder.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TunnelError {
    #[snafu(display("failed to bind local port {port}: {source}"))]
    Bind { port: u16, source: std::io::Error },

    #[snafu(display("failed to launch {program}: {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelErrorKind {
    /// Local port already in use or not permitted.
    Bind,
    /// External SSH client could not be started.
    Spawn,
}

impl TunnelError {
    pub fn kind(&self) -> TunnelErrorKind {
        match self {
            TunnelError::Bind { .. } => TunnelErrorKind::Bind,
            TunnelError::Spawn { .. } => TunnelErrorKind::Spawn,
        }
    }
}
