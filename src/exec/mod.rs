// ABOUTME: Remote command execution over an authenticated transport.
// ABOUTME: Streaming and buffered observation modes with an idle cutoff.

mod engine;
mod request;

pub use engine::execute;
pub use request::{CommandRequest, CommandResult, DEFAULT_EXIT_GRACE, ExecMode, ReadOutcome};
