// ABOUTME: Port forwards declared in the config file.

use crate::tunnel::{ForwardSpec, RelayMode};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ForwardConfig {
    pub remote_port: u16,
    pub local_port: u16,
    #[serde(default)]
    pub relay: RelayMode,
    /// Defaults to the engine's choice for the relay mode.
    #[serde(default)]
    pub remote_host: Option<String>,
}

impl ForwardConfig {
    pub fn spec(&self, default_remote_host: impl Into<String>) -> ForwardSpec {
        let remote_host = self
            .remote_host
            .clone()
            .unwrap_or_else(|| default_remote_host.into());
        ForwardSpec::new(self.remote_port, self.local_port, remote_host, self.relay)
    }
}
