//! Error types for mp4forge-probe.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Errors that can occur while probing a media file.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The ffprobe executable is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// ffprobe ran but reported a failure.
    #[error("tool execution failed: {tool}: {message}")]
    ToolFailed { tool: String, message: String },

    /// The specified file was not found.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// ffprobe produced output with neither a format nor any stream.
    #[error("unrecognized media file: {}", path.display())]
    Unrecognized { path: PathBuf },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a tool execution failed error.
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }
}
