// ABOUTME: Where echoed command output goes.
// ABOUTME: Console sink supports normal, quiet (CI), and JSON line modes.

use serde::Serialize;

/// Receives lines echoed by the execution engine.
pub trait OutputSink: Send {
    /// A stdout line, already decoded. Not called when output is suppressed.
    fn stdout_line(&mut self, line: &str);

    /// A stderr line. Always called, whatever the suppression setting.
    fn stderr_line(&mut self, line: &str);
}

/// Output mode for console feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Lines printed as they arrive
    Normal,
    /// Stdout echo dropped, stderr still shown
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Console sink.
pub struct Output {
    mode: OutputMode,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }
}

impl OutputSink for Output {
    fn stdout_line(&mut self, line: &str) {
        match self.mode {
            OutputMode::Normal => print!("{line}"),
            OutputMode::Quiet => {}
            OutputMode::Json => {
                if let Some(json) = json_line("stdout", line) {
                    println!("{json}");
                }
            }
        }
    }

    fn stderr_line(&mut self, line: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprint!("{line}"),
            OutputMode::Json => {
                if let Some(json) = json_line("stderr", line) {
                    eprintln!("{json}");
                }
            }
        }
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    stream: &'a str,
    line: &'a str,
}

fn json_line(stream: &str, line: &str) -> Option<String> {
    serde_json::to_string(&JsonLine {
        stream,
        line: line.trim_end_matches(['\r', '\n']),
    })
    .ok()
}
