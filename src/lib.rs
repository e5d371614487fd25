// ABOUTME: Library root for reacher - remote command execution and port forwarding.
// ABOUTME: Core engines live in exec and tunnel; ssh provides the russh-backed transport.

pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod output;
pub mod ssh;
pub mod tunnel;
pub mod workspace;
