// ABOUTME: Defaults applied to every command request.
// ABOUTME: Idle timeout and post-timeout grace, written as humantime strings.

use crate::exec::{CommandRequest, DEFAULT_EXIT_GRACE, ExecMode};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandDefaults {
    #[serde(default, with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    #[serde(default = "default_exit_grace", with = "humantime_serde")]
    pub exit_grace: Duration,
}

fn default_exit_grace() -> Duration {
    DEFAULT_EXIT_GRACE
}

impl Default for CommandDefaults {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            exit_grace: default_exit_grace(),
        }
    }
}

impl CommandDefaults {
    /// A request carrying these defaults.
    pub fn request(&self, command: impl Into<String>, mode: ExecMode) -> CommandRequest {
        CommandRequest::new(command, mode)
            .idle_timeout_opt(self.idle_timeout)
            .exit_grace(self.exit_grace)
    }
}
