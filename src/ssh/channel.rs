// ABOUTME: russh-backed command channel.
// ABOUTME: Splits stdout into lines and keeps stderr and exit status aside until asked.

use super::error::{Error, Result};
use super::transport::CommandChannel;
use async_trait::async_trait;
use bytes::BytesMut;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

/// Stdout bytes waiting to be handed out as lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next `\n`-terminated line, newline kept. At end of stream the unterminated
    /// remainder comes out, then empty lines. `None` means more data is needed.
    pub(crate) fn next_line(&mut self, eof: bool) -> Option<Vec<u8>> {
        if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            return Some(self.buf.split_to(pos + 1).to_vec());
        }
        if eof {
            return Some(self.buf.split().to_vec());
        }
        None
    }
}

pub(crate) struct RusshCommandChannel {
    channel: Channel<Msg>,
    stdout: LineBuffer,
    stderr: BytesMut,
    exit_status: Option<u32>,
    /// No more data will arrive.
    eof: bool,
    /// The channel is gone; no more messages of any kind.
    closed: bool,
}

impl RusshCommandChannel {
    pub(crate) fn new(channel: Channel<Msg>) -> Self {
        Self {
            channel,
            stdout: LineBuffer::default(),
            stderr: BytesMut::new(),
            exit_status: None,
            eof: false,
            closed: false,
        }
    }

    /// Wait for one channel message and file it away.
    async fn pump(&mut self) {
        match self.channel.wait().await {
            Some(ChannelMsg::Data { data }) => {
                self.stdout.push(&data);
            }
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                if ext == 1 {
                    self.stderr.extend_from_slice(&data);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                self.exit_status = Some(exit_status);
            }
            Some(ChannelMsg::Eof) => {
                self.eof = true;
            }
            Some(ChannelMsg::Close) | None => {
                self.eof = true;
                self.closed = true;
            }
            Some(_) => {}
        }
    }
}

#[async_trait]
impl CommandChannel for RusshCommandChannel {
    async fn read_stdout_line(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(line) = self.stdout.next_line(self.eof) {
                return Ok(line);
            }
            self.pump().await;
        }
    }

    async fn wait_exit_status(&mut self) -> Result<u32> {
        loop {
            if let Some(status) = self.exit_status {
                return Ok(status);
            }
            if self.closed {
                return Err(Error::ChannelClosed);
            }
            self.pump().await;
        }
    }

    async fn read_stderr_lines(&mut self) -> Result<Vec<Vec<u8>>> {
        while !self.eof {
            self.pump().await;
        }
        Ok(split_lines(&self.stderr.split()))
    }

    fn detach(self: Box<Self>) {
        let mut channel = self.channel;
        tokio::spawn(async move {
            while channel.wait().await.is_some() {}
            tracing::debug!("Detached command channel closed");
        });
    }
}

/// Split a buffer into `\n`-terminated lines, keeping a trailing fragment.
pub(crate) fn split_lines(buf: &[u8]) -> Vec<Vec<u8>> {
    buf.split_inclusive(|b| *b == b'\n')
        .map(|line| line.to_vec())
        .collect()
}
