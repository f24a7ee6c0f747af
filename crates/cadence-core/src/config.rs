use serde::{Deserialize, Serialize};

/// Root of `config.toml`.
///
/// Every section is optional in the file; missing sections fall back to
/// their defaults so a partially written config still loads.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// How the external agent CLI is launched.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_agent_command")]
    pub command: String,
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
    /// Working directory used when a session is opened without one.
    #[serde(default)]
    pub working_directory: Option<String>,
    /// Extra directories prepended to PATH for the subprocess.
    #[serde(default)]
    pub extra_path: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            args: default_agent_args(),
            working_directory: None,
            extra_path: Vec::new(),
        }
    }
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_agent_args() -> Vec<String> {
    [
        "--print",
        "--verbose",
        "--input-format",
        "stream-json",
        "--output-format",
        "stream-json",
        "--include-partial-messages",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct StorageConfig {
    /// Overrides the default database location under the data dir.
    #[serde(default)]
    pub database_path: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write a daily-rolling log file under the logs dir.
    #[serde(default = "default_true")]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// When false, queued messages are only sent on explicit request.
    #[serde(default = "default_true")]
    pub auto_dispatch: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            auto_dispatch: true,
        }
    }
}

fn default_true() -> bool {
    true
}
