// ABOUTME: Configuration types and parsing for reacher.yml.
// ABOUTME: Server identity, command defaults, and declared port forwards.

mod command;
mod forward;
mod server;

pub use command::CommandDefaults;
pub use forward::ForwardConfig;
pub use server::ServerConfig;

use crate::error::{Error, Result};
use crate::ssh::SessionConfig;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "reacher.yml";
pub const CONFIG_FILENAME_ALT: &str = "reacher.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".reacher/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_server")]
    pub server: ServerConfig,

    #[serde(default)]
    pub build_name: Option<String>,

    #[serde(default)]
    pub command: CommandDefaults,

    #[serde(default)]
    pub forwards: Vec<ForwardConfig>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn session_config(&self) -> SessionConfig {
        self.server.session_config()
    }

    fn validate(&self) -> Result<()> {
        for forward in &self.forwards {
            if forward.remote_port == 0 {
                return Err(Error::InvalidConfig(format!(
                    "forward from local port {} has no remote port",
                    forward.local_port
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for forward in self.forwards.iter().filter(|f| f.local_port != 0) {
            if !seen.insert(forward.local_port) {
                return Err(Error::InvalidConfig(format!(
                    "local port {} is forwarded more than once",
                    forward.local_port
                )));
            }
        }

        if let Some(name) = &self.build_name {
            if name.is_empty() || name.contains('/') || name.contains(char::is_whitespace) {
                return Err(Error::InvalidConfig(format!(
                    "build name {:?} must be a single non-empty path segment",
                    name
                )));
            }
        }

        Ok(())
    }
}

// Custom deserializers

fn deserialize_server<'de, D>(deserializer: D) -> std::result::Result<ServerConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    ServerEntry::deserialize(deserializer)?
        .into_server_config()
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServerEntry {
    Simple(String),
    Detailed(ServerConfig),
}

impl ServerEntry {
    fn into_server_config(self) -> std::result::Result<ServerConfig, String> {
        match self {
            ServerEntry::Simple(s) => ServerConfig::parse(&s),
            ServerEntry::Detailed(c) => Ok(c),
        }
    }
}
