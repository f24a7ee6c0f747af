//! Agent execution environment utilities.

use std::path::{Path, PathBuf};

/// Builds the PATH handed to the agent subprocess.
///
/// GUI-launched processes on macOS inherit a minimal PATH, so the agent CLI
/// and the tools it shells out to are often missing from it.
///
/// # Priority Order
/// 1. Workspace tool directories (node_modules/.bin, .venv/bin)
/// 2. User-configured `extra_path` entries
/// 3. Common binary locations (Homebrew, /usr/local/bin, ...)
/// 4. User home bin directories (~/.local/bin, ~/bin)
/// 5. Existing PATH entries
pub fn build_agent_path(working_directory: &Path, extra_path: &[String]) -> String {
    let current_path = std::env::var("PATH").unwrap_or_default();
    let mut components: Vec<String> = Vec::new();
    let mut push = |entry: String| {
        if !entry.is_empty() && !components.contains(&entry) {
            components.push(entry);
        }
    };

    for dir in [
        working_directory.join("node_modules/.bin"),
        working_directory.join(".venv/bin"),
    ] {
        if dir.exists() {
            if let Some(dir_str) = dir.to_str() {
                push(dir_str.to_string());
            }
        }
    }

    for entry in extra_path {
        push(entry.clone());
    }

    for entry in [
        "/opt/homebrew/bin", // Apple Silicon Homebrew
        "/usr/local/bin",
        "/usr/bin",
        "/bin",
        "/usr/sbin",
        "/sbin",
    ] {
        push(entry.to_string());
    }

    if let Some(home) = std::env::var_os("HOME") {
        for dir in [
            PathBuf::from(&home).join(".local/bin"),
            PathBuf::from(&home).join("bin"),
        ] {
            if dir.exists() {
                if let Some(dir_str) = dir.to_str() {
                    push(dir_str.to_string());
                }
            }
        }
    }

    for existing in current_path.split(':') {
        push(existing.to_string());
    }

    components.join(":")
}
