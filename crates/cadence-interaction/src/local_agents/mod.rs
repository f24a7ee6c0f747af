mod claude_code;
mod process;

pub use claude_code::ClaudeCodeLauncher;
pub use process::ProcessTransport;
