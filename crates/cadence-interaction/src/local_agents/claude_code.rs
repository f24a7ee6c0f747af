//! ClaudeCodeLauncher - starts the Claude CLI in stream-JSON mode.
//!
//! Each session gets its own long-lived `claude` process. Messages are written
//! to its stdin as JSON lines and its stdout is framed into protocol records.

use super::process::ProcessTransport;
use async_trait::async_trait;
use cadence_core::agent::{AgentLauncher, LaunchRequest, LaunchedAgent, build_agent_path};
use cadence_core::config::AgentConfig;
use cadence_core::{CadenceError, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Launches the configured agent command for a session.
///
/// # Example
///
/// ```rust,ignore
/// use cadence_interaction::ClaudeCodeLauncher;
///
/// let launcher = ClaudeCodeLauncher::new("claude")
///     .with_args(vec!["--print".into(), "--output-format".into(), "stream-json".into()]);
/// ```
#[derive(Debug, Clone)]
pub struct ClaudeCodeLauncher {
    /// Executable name or path. Names are searched in PATH.
    command: String,
    args: Vec<String>,
    extra_path: Vec<String>,
}

impl ClaudeCodeLauncher {
    /// Creates a launcher for `command` with no arguments.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            extra_path: Vec::new(),
        }
    }

    /// Creates a launcher from the `[agent]` config section.
    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.command.clone())
            .with_args(config.args.clone())
            .with_extra_path(config.extra_path.clone())
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Additional PATH entries for the subprocess.
    pub fn with_extra_path(mut self, extra_path: Vec<String>) -> Self {
        self.extra_path = extra_path;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn build_command(&self, working_directory: &Path) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .current_dir(working_directory)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // App bundles don't inherit the login shell PATH.
        cmd.env("PATH", build_agent_path(working_directory, &self.extra_path));
        cmd
    }
}

impl Default for ClaudeCodeLauncher {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

#[async_trait]
impl AgentLauncher for ClaudeCodeLauncher {
    async fn launch(&self, request: &LaunchRequest) -> Result<LaunchedAgent> {
        if !request.working_directory.is_dir() {
            return Err(CadenceError::invalid_input(format!(
                "working directory does not exist: {}",
                request.working_directory.display()
            )));
        }

        tracing::info!(
            "[Agent] Launching '{}' for session {} in {}",
            self.command,
            request.session_id,
            request.working_directory.display()
        );
        tracing::debug!("[Agent] Args: {:?}", self.args);

        let child = self
            .build_command(&request.working_directory)
            .spawn()
            .map_err(|e| {
                tracing::error!("[Agent] Failed to spawn '{}': {}", self.command, e);
                CadenceError::transport(format!(
                    "Failed to spawn '{}': {}. Make sure the CLI is installed and in PATH, \
                     or set [agent].command in config.toml.",
                    self.command, e
                ))
            })?;

        ProcessTransport::start(request.session_id.clone(), child)
    }

    /// Checks whether the command resolves, using `which` on Unix/macOS or
    /// `where` on Windows.
    async fn is_available(&self) -> bool {
        if self.command.contains(std::path::MAIN_SEPARATOR) {
            return Path::new(&self.command).is_file();
        }

        #[cfg(unix)]
        let check_cmd = "which";
        #[cfg(windows)]
        let check_cmd = "where";

        Command::new(check_cmd)
            .arg(&self.command)
            .env("PATH", build_agent_path(Path::new("."), &self.extra_path))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}
