// ABOUTME: Forwarding delegated to an external ssh client process.
// ABOUTME: Launches `ssh -L ... -N` and owns the child until it exits.

use super::error::{SpawnSnafu, TunnelError};
use crate::ssh::Identity;
use snafu::ResultExt;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Default external client.
pub const DEFAULT_SSH_PROGRAM: &str = "ssh";

/// Arguments for a local forward of `local_port` to `remote_host:remote_port`,
/// as seen from the SSH server.
pub fn ssh_forward_args(
    identity: &Identity,
    local_port: u16,
    remote_host: &str,
    remote_port: u16,
) -> Vec<String> {
    let mut args = vec![
        "-L".to_string(),
        format!("{}:{}:{}", local_port, remote_host, remote_port),
        "-N".to_string(),
        format!("{}@{}", identity.user, identity.host),
        "-p".to_string(),
        identity.port.to_string(),
    ];
    if let Some(key) = &identity.key_path {
        args.push("-i".to_string());
        args.push(key.display().to_string());
    }
    args
}

/// A running ssh client doing the forwarding.
pub(crate) struct ProcessRelay {
    child: Child,
    program: String,
}

impl ProcessRelay {
    pub(crate) fn launch(
        program: &str,
        identity: &Identity,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Self, TunnelError> {
        let args = ssh_forward_args(identity, local_port, remote_host, remote_port);
        tracing::debug!("Launching {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .spawn()
            .context(SpawnSnafu { program })?;

        Ok(Self {
            child,
            program: program.to_string(),
        })
    }

    /// Wait on the child; it normally lives as long as the process.
    pub(crate) async fn run(mut self) {
        match self.child.wait().await {
            Ok(status) if status.success() => {
                tracing::info!("{} forwarder exited", self.program);
            }
            Ok(status) => {
                tracing::warn!("{} forwarder exited with {}", self.program, status);
            }
            Err(e) => {
                tracing::warn!("Failed to wait on {} forwarder: {}", self.program, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn identity(key_path: Option<PathBuf>) -> Identity {
        Identity {
            host: "gpu-box".to_string(),
            user: "alice".to_string(),
            port: 2200,
            key_path,
        }
    }

    #[test]
    fn forward_args_encode_ports_and_identity() {
        let args = ssh_forward_args(&identity(None), 9090, "localhost", 8080);
        assert_eq!(
            args,
            vec!["-L", "9090:localhost:8080", "-N", "alice@gpu-box", "-p", "2200"]
        );
    }

    #[test]
    fn forward_args_include_key_when_configured() {
        let args = ssh_forward_args(
            &identity(Some(PathBuf::from("/home/alice/.ssh/id_ed25519"))),
            9090,
            "localhost",
            8080,
        );
        assert_eq!(&args[6..], ["-i", "/home/alice/.ssh/id_ed25519"]);
    }
}
