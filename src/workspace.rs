// ABOUTME: Per-build workspace on the remote host.
// ABOUTME: Directory bookkeeping and screen session wrapping on top of exec.

use crate::config::CommandDefaults;
use crate::exec::{self, CommandRequest, CommandResult, ExecMode};
use crate::output::{Output, OutputMode, OutputSink};
use crate::ssh::{Result, Transport};
use std::sync::Arc;

pub const WORKSPACE_DIR: &str = ".reacher";
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const LOGS_DIR: &str = "logs";

/// Options for [`Workspace::run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: ExecMode,
    pub suppress_output: bool,
    /// Run inside a detachable screen session.
    pub wrap_in_screen: bool,
    /// Screen session name; a random one is used when unset. Ignored unless
    /// `wrap_in_screen` is set.
    pub named_session: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: ExecMode::Streaming,
            suppress_output: false,
            wrap_in_screen: false,
            named_session: None,
        }
    }
}

impl RunOptions {
    pub fn in_screen(name: Option<&str>) -> Self {
        Self {
            wrap_in_screen: true,
            named_session: name.map(str::to_string),
            ..Self::default()
        }
    }
}

/// Wrap `command` in a named screen session.
pub fn wrap_in_screen(command: &str, named_session: Option<&str>) -> String {
    let name = match named_session {
        Some(name) => name.to_string(),
        None => uuid::Uuid::new_v4().to_string(),
    };
    format!("screen -S {} {}", name, command)
}

/// A build directory under `~/.reacher` on the remote host.
pub struct Workspace<T: ?Sized> {
    transport: Arc<T>,
    build_name: String,
    defaults: CommandDefaults,
    output: Box<dyn OutputSink>,
}

impl<T> Workspace<T>
where
    T: Transport + ?Sized,
{
    pub fn new(transport: Arc<T>, build_name: impl Into<String>) -> Self {
        Self {
            transport,
            build_name: build_name.into(),
            defaults: CommandDefaults::default(),
            output: Box::new(Output::new(OutputMode::Normal)),
        }
    }

    pub fn with_defaults(mut self, defaults: CommandDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_output(mut self, output: impl OutputSink + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn build_name(&self) -> &str {
        &self.build_name
    }

    pub fn workspace_path(&self) -> String {
        format!("/home/{}/{}", self.transport.identity().user, WORKSPACE_DIR)
    }

    pub fn build_path(&self) -> String {
        format!("{}/{}", self.workspace_path(), self.build_name)
    }

    pub fn artifact_path(&self) -> String {
        format!("{}/{}", self.build_path(), ARTIFACTS_DIR)
    }

    pub fn log_path(&self) -> String {
        format!("{}/{}", self.build_path(), LOGS_DIR)
    }

    /// Create the build, artifact and log directories.
    pub async fn setup(&mut self) -> Result<CommandResult> {
        let command = format!(
            "mkdir -p {} && mkdir -p {} && mkdir -p {}",
            self.build_path(),
            self.artifact_path(),
            self.log_path()
        );
        let request = self.defaults.request(command, ExecMode::Buffered);
        self.execute(request).await
    }

    /// Remove the build directory and recreate it empty.
    pub async fn clear(&mut self) -> Result<CommandResult> {
        let request = self
            .defaults
            .request(format!("rm -rf {}", self.build_path()), ExecMode::Buffered)
            .suppress_output(true);
        self.execute(request).await?;
        self.setup().await
    }

    /// List everything under the build directory, or under `folder` inside it.
    pub async fn ls(&mut self, folder: Option<&str>) -> Result<CommandResult> {
        let path = match folder {
            Some(folder) => format!("{}/{}", self.build_path(), folder),
            None => self.build_path(),
        };
        let request = self
            .defaults
            .request(format!("find {} -print", path), ExecMode::Buffered);
        self.execute(request).await
    }

    /// Run `command` from the build directory.
    pub async fn run(&mut self, command: &str, options: RunOptions) -> Result<CommandResult> {
        let command = if options.wrap_in_screen {
            wrap_in_screen(command, options.named_session.as_deref())
        } else {
            command.to_string()
        };
        let command = format!("cd {} && {}", self.build_path(), command);
        let request = self
            .defaults
            .request(command, options.mode)
            .suppress_output(options.suppress_output);
        self.execute(request).await
    }

    pub async fn list_sessions(&mut self) -> Result<CommandResult> {
        self.run("screen -list", RunOptions::default()).await
    }

    pub async fn attach_session(&mut self, name: &str) -> Result<CommandResult> {
        self.run(&format!("screen -r -d {}", name), RunOptions::default())
            .await
    }

    pub async fn kill_session(&mut self, name: &str) -> Result<CommandResult> {
        self.run(&format!("screen -X -S {} quit", name), RunOptions::default())
            .await
    }

    async fn execute(&mut self, request: CommandRequest) -> Result<CommandResult> {
        tracing::debug!("[{}] {}", self.build_name, request.command);
        exec::execute(self.transport.as_ref(), &request, self.output.as_mut()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_wrap_uses_given_name() {
        assert_eq!(
            wrap_in_screen("python train.py", Some("train")),
            "screen -S train python train.py"
        );
    }

    #[test]
    fn screen_wrap_generates_unique_names() {
        let a = wrap_in_screen("ls", None);
        let b = wrap_in_screen("ls", None);
        assert!(a.starts_with("screen -S "));
        assert!(a.ends_with(" ls"));
        assert_ne!(a, b);
    }
}
