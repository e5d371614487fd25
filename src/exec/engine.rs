// ABOUTME: Runs one command over a transport and reads its output.
// ABOUTME: Line-oriented stdout with idle cutoff, then exit status, then stderr.

use super::request::{CommandRequest, CommandResult, ExecMode, ReadOutcome};
use crate::output::OutputSink;
use crate::ssh::{CommandChannel, Result, Transport};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Run `request` on a fresh command channel.
///
/// Only opening the channel can fail. Everything after that, including an idle
/// cutoff or a channel dying mid-read, is reported through [`ReadOutcome`].
pub async fn execute<T>(
    transport: &T,
    request: &CommandRequest,
    sink: &mut dyn OutputSink,
) -> Result<CommandResult>
where
    T: Transport + ?Sized,
{
    let mut channel = transport
        .open_command_channel(&request.command, true)
        .await?;

    if request.ignore_output {
        tracing::debug!("Ignoring output of {:?}", request.command);
        channel.detach();
        return Ok(CommandResult::detached());
    }

    let stdout = read_stdout(channel.as_mut(), request, sink).await;
    if stdout.decode_failures > 0 {
        tracing::debug!(
            "{} stdout line(s) of {:?} were not valid UTF-8",
            stdout.decode_failures,
            request.command
        );
    }

    let captured_text = match request.mode {
        ExecMode::Streaming => None,
        ExecMode::Buffered => {
            if !request.suppress_output {
                for line in &stdout.lines {
                    sink.stdout_line(line);
                }
            }
            Some(stdout.lines.concat())
        }
    };

    // After a cutoff or a failed read the channel may never answer; don't wait on it.
    let bound = match stdout.outcome {
        ReadOutcome::TimedOut | ReadOutcome::RemoteClosed => Some(request.exit_grace),
        ReadOutcome::Completed | ReadOutcome::Detached => None,
    };

    let exit_status = match bounded(bound, channel.wait_exit_status()).await {
        Some(Ok(status)) => Some(status),
        Some(Err(e)) => {
            tracing::warn!("No exit status for {:?}: {}", request.command, e);
            None
        }
        None => None,
    };

    let stderr_lines: Vec<String> = match bounded(bound, channel.read_stderr_lines()).await {
        Some(Ok(lines)) => lines
            .into_iter()
            .map(|line| decode_line(line).unwrap_or_default())
            .collect(),
        Some(Err(e)) => {
            tracing::debug!("Failed to drain stderr of {:?}: {}", request.command, e);
            Vec::new()
        }
        None => Vec::new(),
    };
    for line in &stderr_lines {
        sink.stderr_line(line);
    }

    Ok(CommandResult {
        captured_text,
        exit_status,
        stderr_lines,
        outcome: stdout.outcome,
    })
}

struct StdoutRead {
    /// Decoded lines, kept only in buffered mode.
    lines: Vec<String>,
    outcome: ReadOutcome,
    decode_failures: usize,
}

async fn read_stdout(
    channel: &mut dyn CommandChannel,
    request: &CommandRequest,
    sink: &mut dyn OutputSink,
) -> StdoutRead {
    let mut read = StdoutRead {
        lines: Vec::new(),
        outcome: ReadOutcome::Completed,
        decode_failures: 0,
    };
    let mut last_received = Instant::now();

    loop {
        let next = match request.idle_timeout {
            Some(idle) => {
                match tokio::time::timeout_at(last_received + idle, channel.read_stdout_line())
                    .await
                {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::debug!(
                            "No output from {:?} for {:?}, stopping read",
                            request.command,
                            idle
                        );
                        read.outcome = ReadOutcome::TimedOut;
                        break;
                    }
                }
            }
            None => channel.read_stdout_line().await,
        };

        let bytes = match next {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("Stdout read of {:?} failed: {}", request.command, e);
                read.outcome = ReadOutcome::RemoteClosed;
                break;
            }
        };
        last_received = Instant::now();

        if bytes.is_empty() {
            break;
        }

        let line = decode_line(bytes).unwrap_or_else(|| {
            read.decode_failures += 1;
            String::new()
        });

        match request.mode {
            ExecMode::Streaming => {
                if !request.suppress_output {
                    sink.stdout_line(&line);
                }
            }
            ExecMode::Buffered => read.lines.push(line),
        }
    }

    read
}

/// Await `fut`, giving up after `limit` if one is set.
async fn bounded<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Decode one line as UTF-8. `None` when the bytes are not valid text.
pub(crate) fn decode_line(bytes: Vec<u8>) -> Option<String> {
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn invalid_utf8_is_rejected() {
        assert_eq!(decode_line(vec![0x66, 0xff, 0x0a]), None);
    }

    #[tokio::test]
    async fn bounded_without_limit_waits() {
        assert_eq!(bounded(None, async { 7 }).await, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_gives_up() {
        let never = std::future::pending::<u32>();
        assert_eq!(bounded(Some(Duration::from_millis(50)), never).await, None);
    }

    proptest! {
        #[test]
        fn well_formed_lines_decode_losslessly(text in "\\PC*") {
            let line = format!("{text}\n");
            prop_assert_eq!(decode_line(line.clone().into_bytes()), Some(line));
        }
    }
}
