// ABOUTME: Inputs and outputs of a remote command execution.
// ABOUTME: CommandRequest is built once per call; CommandResult carries partial data and a reason.

use std::time::Duration;

/// Default bound on the exit status and stderr reads after an idle cutoff.
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_millis(100);

/// How stdout is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Lines are echoed as they arrive and not kept.
    Streaming,
    /// Lines are collected, echoed once the stream ends, and returned.
    Buffered,
}

/// A command to run on the remote host.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: String,
    pub mode: ExecMode,
    /// Do not echo stdout. Stderr is always echoed.
    pub suppress_output: bool,
    /// Start the command and return without reading anything.
    pub ignore_output: bool,
    /// Stop reading when no stdout line arrives for this long.
    pub idle_timeout: Option<Duration>,
    /// How long to wait for exit status and stderr once the idle timeout fired.
    pub exit_grace: Duration,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, mode: ExecMode) -> Self {
        Self {
            command: command.into(),
            mode,
            suppress_output: false,
            ignore_output: false,
            idle_timeout: None,
            exit_grace: DEFAULT_EXIT_GRACE,
        }
    }

    pub fn streaming(command: impl Into<String>) -> Self {
        Self::new(command, ExecMode::Streaming)
    }

    pub fn buffered(command: impl Into<String>) -> Self {
        Self::new(command, ExecMode::Buffered)
    }

    pub fn suppress_output(mut self, suppress: bool) -> Self {
        self.suppress_output = suppress;
        self
    }

    pub fn ignore_output(mut self, ignore: bool) -> Self {
        self.ignore_output = ignore;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set or clear the idle timeout.
    pub fn idle_timeout_opt(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn exit_grace(mut self, grace: Duration) -> Self {
        self.exit_grace = grace;
        self
    }
}

/// Why the stdout read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// End of stream was reached.
    Completed,
    /// No line arrived within the idle timeout.
    TimedOut,
    /// The channel failed mid-read; output up to that point is kept.
    RemoteClosed,
    /// Output was ignored and the channel handed off unread.
    Detached,
}

/// Result of a remote command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// All stdout in arrival order. Always `None` for streaming or ignored output.
    pub captured_text: Option<String>,
    /// `None` when the command had not reported a status by the time we asked.
    pub exit_status: Option<u32>,
    pub stderr_lines: Vec<String>,
    pub outcome: ReadOutcome,
}

impl CommandResult {
    pub(crate) fn detached() -> Self {
        Self {
            captured_text: None,
            exit_status: None,
            stderr_lines: Vec::new(),
            outcome: ReadOutcome::Detached,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Captured text, or an empty string when nothing was captured.
    pub fn text(&self) -> &str {
        self.captured_text.as_deref().unwrap_or("")
    }
}
