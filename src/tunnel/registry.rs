// ABOUTME: Caller-owned record of running forwarders.
// ABOUTME: Holds task handles without ever joining them; register and list only.

use super::ForwardSpec;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::net::SocketAddr;
use tokio::task::JoinHandle;

/// A forwarder running as a detached task.
///
/// The task is never awaited. Dropping the handle (or the registry holding it)
/// leaves the forwarder running until the process exits.
#[derive(Debug)]
pub struct ForwarderHandle {
    spec: ForwardSpec,
    local_addr: SocketAddr,
    started_at: DateTime<Utc>,
    task: JoinHandle<()>,
}

impl ForwarderHandle {
    pub(crate) fn new(spec: ForwardSpec, local_addr: SocketAddr, task: JoinHandle<()>) -> Self {
        Self {
            spec,
            local_addr,
            started_at: Utc::now(),
            task,
        }
    }

    pub fn info(&self) -> ForwarderInfo {
        ForwarderInfo {
            spec: self.spec.clone(),
            local_addr: self.local_addr,
            started_at: self.started_at,
            running: !self.task.is_finished(),
        }
    }
}

/// Snapshot of one forwarder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderInfo {
    pub spec: ForwardSpec,
    /// Address the local listener is bound to.
    pub local_addr: SocketAddr,
    pub started_at: DateTime<Utc>,
    /// False once the accept loop or child process has ended.
    pub running: bool,
}

/// All forwarders started by one caller.
#[derive(Debug, Default)]
pub struct TunnelRegistry {
    forwarders: Mutex<Vec<ForwarderHandle>>,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: ForwarderHandle) -> ForwarderInfo {
        let info = handle.info();
        self.forwarders.lock().push(handle);
        info
    }

    /// Forwarders in registration order.
    pub fn list(&self) -> Vec<ForwarderInfo> {
        self.forwarders.lock().iter().map(ForwarderHandle::info).collect()
    }
}
