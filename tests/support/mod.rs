// ABOUTME: Test support utilities.
// ABOUTME: In-memory transport, scripted command channels, and a recording output sink.

use async_trait::async_trait;
use parking_lot::Mutex;
use reacher::output::OutputSink;
use reacher::ssh::{CommandChannel, Error, Identity, Result, Transport, TunnelStream};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter =
            EnvFilter::from_default_env().add_directive("reacher=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn identity() -> Identity {
    Identity {
        host: "gpu-box".to_string(),
        user: "alice".to_string(),
        port: 22,
        key_path: None,
    }
}

/// What `wait_exit_status` does once reached.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum ExitBehavior {
    Status(u32),
    /// Channel went away without a status.
    Closed,
    /// Command is still running; never answers.
    Never,
}

/// Script for one command channel.
#[derive(Debug, Clone)]
pub struct ScriptedCommand {
    lines: VecDeque<Vec<u8>>,
    line_delay: Option<Duration>,
    /// Block forever once the lines run out instead of reporting end of stream.
    hang: bool,
    /// Fail the read once the lines run out, as a dropped connection would.
    fail: bool,
    exit: ExitBehavior,
    stderr: Vec<Vec<u8>>,
}

#[allow(dead_code)]
impl ScriptedCommand {
    pub fn new() -> Self {
        Self {
            lines: VecDeque::new(),
            line_delay: None,
            hang: false,
            fail: false,
            exit: ExitBehavior::Status(0),
            stderr: Vec::new(),
        }
    }

    pub fn line(mut self, line: impl AsRef<[u8]>) -> Self {
        self.lines.push_back(line.as_ref().to_vec());
        self
    }

    pub fn line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = Some(delay);
        self
    }

    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn fail(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn exit(mut self, exit: ExitBehavior) -> Self {
        self.exit = exit;
        self
    }

    pub fn stderr(mut self, line: impl AsRef<[u8]>) -> Self {
        self.stderr.push(line.as_ref().to_vec());
        self
    }
}

/// What a fake channel went through, in order.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    StdoutRead,
    ExitStatusRead,
    StderrRead,
    Detached,
}

struct FakeCommandChannel {
    script: ScriptedCommand,
    events: Arc<Mutex<Vec<ChannelEvent>>>,
}

#[async_trait]
impl CommandChannel for FakeCommandChannel {
    async fn read_stdout_line(&mut self) -> Result<Vec<u8>> {
        self.events.lock().push(ChannelEvent::StdoutRead);
        if let Some(delay) = self.script.line_delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.lines.pop_front() {
            Some(line) => Ok(line),
            None if self.script.fail => Err(Error::ChannelClosed),
            None if self.script.hang => std::future::pending().await,
            None => Ok(Vec::new()),
        }
    }

    async fn wait_exit_status(&mut self) -> Result<u32> {
        self.events.lock().push(ChannelEvent::ExitStatusRead);
        match self.script.exit {
            ExitBehavior::Status(status) => Ok(status),
            ExitBehavior::Closed => Err(Error::ChannelClosed),
            ExitBehavior::Never => std::future::pending().await,
        }
    }

    async fn read_stderr_lines(&mut self) -> Result<Vec<Vec<u8>>> {
        self.events.lock().push(ChannelEvent::StderrRead);
        Ok(std::mem::take(&mut self.script.stderr))
    }

    fn detach(self: Box<Self>) {
        self.events.lock().push(ChannelEvent::Detached);
    }
}

/// How the next direct channel request is answered.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum DirectBehavior {
    Accept,
    Reject,
}

/// Remote end of an accepted direct channel, handed to the test.
#[allow(dead_code)]
pub struct FarEnd {
    pub stream: DuplexStream,
    pub host: String,
    pub port: u16,
    pub peer: SocketAddr,
}

pub struct FakeTransport {
    identity: Identity,
    commands: Mutex<VecDeque<ScriptedCommand>>,
    opened: Mutex<Vec<(String, bool)>>,
    events: Arc<Mutex<Vec<ChannelEvent>>>,
    direct: Mutex<VecDeque<DirectBehavior>>,
    far_tx: mpsc::UnboundedSender<FarEnd>,
    far_rx: Mutex<Option<mpsc::UnboundedReceiver<FarEnd>>>,
}

#[allow(dead_code)]
impl FakeTransport {
    pub fn new() -> Self {
        let (far_tx, far_rx) = mpsc::unbounded_channel();
        Self {
            identity: identity(),
            commands: Mutex::new(VecDeque::new()),
            opened: Mutex::new(Vec::new()),
            events: Arc::new(Mutex::new(Vec::new())),
            direct: Mutex::new(VecDeque::new()),
            far_tx,
            far_rx: Mutex::new(Some(far_rx)),
        }
    }

    /// Queue the script for the next command channel.
    pub fn script(&self, command: ScriptedCommand) {
        self.commands.lock().push_back(command);
    }

    /// Queue the answer for an upcoming direct channel request. Unqueued requests are accepted.
    pub fn direct(&self, behavior: DirectBehavior) {
        self.direct.lock().push_back(behavior);
    }

    /// Commands opened so far, with whether a pty was requested.
    pub fn opened(&self) -> Vec<(String, bool)> {
        self.opened.lock().clone()
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        self.events.lock().clone()
    }

    /// Receiver for accepted direct channels. Can be taken once.
    pub fn far_ends(&self) -> mpsc::UnboundedReceiver<FarEnd> {
        self.far_rx.lock().take().expect("far ends already taken")
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    async fn open_command_channel(
        &self,
        command: &str,
        want_pty: bool,
    ) -> Result<Box<dyn CommandChannel>> {
        self.opened.lock().push((command.to_string(), want_pty));
        let script = self
            .commands
            .lock()
            .pop_front()
            .ok_or_else(|| Error::CommandChannel("no session channel available".to_string()))?;
        Ok(Box::new(FakeCommandChannel {
            script,
            events: Arc::clone(&self.events),
        }))
    }

    async fn open_direct_channel(
        &self,
        remote_host: &str,
        remote_port: u16,
        local_peer: SocketAddr,
    ) -> Result<TunnelStream> {
        let behavior = self
            .direct
            .lock()
            .pop_front()
            .unwrap_or(DirectBehavior::Accept);
        match behavior {
            DirectBehavior::Reject => Err(Error::ChannelRejected {
                host: remote_host.to_string(),
                port: remote_port,
                reason: "ConnectFailed".to_string(),
            }),
            DirectBehavior::Accept => {
                let (near, far) = tokio::io::duplex(64 * 1024);
                let _ = self.far_tx.send(FarEnd {
                    stream: far,
                    host: remote_host.to_string(),
                    port: remote_port,
                    peer: local_peer,
                });
                Ok(Box::new(near))
            }
        }
    }
}

/// Which stream a recorded line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Output sink that remembers everything. Clones share the same record.
#[derive(Clone, Default)]
pub struct RecordingSink {
    lines: Arc<Mutex<Vec<(Stream, String)>>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn stdout(&self) -> Vec<String> {
        self.filtered(Stream::Stdout)
    }

    pub fn stderr(&self) -> Vec<String> {
        self.filtered(Stream::Stderr)
    }

    fn filtered(&self, stream: Stream) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl OutputSink for RecordingSink {
    fn stdout_line(&mut self, line: &str) {
        self.lines.lock().push((Stream::Stdout, line.to_string()));
    }

    fn stderr_line(&mut self, line: &str) {
        self.lines.lock().push((Stream::Stderr, line.to_string()));
    }
}
