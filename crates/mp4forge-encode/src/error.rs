//! Error types for mp4forge-encode.

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, EncodeError>;

/// Errors that can occur while supervising an encode.
///
/// Terminal failures carry the full command line and the captured encoder
/// output so that a failure can be reproduced from the log alone.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// The input file disappeared before the encoder was spawned.
    #[error("input file does not exist: {path}")]
    InputNotFound { path: String },

    /// The encoder executable could not be spawned.
    #[error("failed to spawn encoder: {message}")]
    Spawn { message: String },

    /// The encoder reported the same frame for longer than the stall
    /// budget. Usually indicates a corrupt source.
    #[error("no forward progress for {budget_secs}s, source may be corrupt (pid {pid})")]
    FrameStall {
        budget_secs: u64,
        cmd: String,
        output: String,
        pid: u32,
    },

    /// The encoder produced no data within the read-cycle budget. Distinct
    /// from an encoder-reported error: the process went silent.
    #[error("encoder became unresponsive (pid {pid})")]
    Timeout {
        cmd: String,
        output: String,
        pid: u32,
    },

    /// The encoder diagnosed an error in its terminal output.
    #[error("{message}{}", detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    EncoderReported {
        message: String,
        detail: Option<String>,
        cmd: String,
        output: String,
        pid: u32,
    },

    /// Audio/video timestamps desynchronized mid-stream in a copy-video
    /// job; the caller must re-run the whole job with a forced full
    /// re-encode of video. Never retried silently.
    #[error("timestamp desync in copy-video job, full re-encode required (pid {pid})")]
    RequiresFullReencode {
        cmd: String,
        output: String,
        pid: u32,
    },

    /// The encoder exited nonzero without a recognizable diagnostic.
    #[error("encoder exited with code {code} (pid {pid})")]
    ExitStatus {
        code: i32,
        cmd: String,
        output: String,
        pid: u32,
    },

    /// No progress and no recognizable terminal line: not declared a
    /// success.
    #[error("unknown encoder failure (pid {pid})")]
    Unknown {
        cmd: String,
        output: String,
        pid: u32,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncodeError {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// The full command line of the failed invocation, when captured.
    pub fn command_line(&self) -> Option<&str> {
        match self {
            EncodeError::FrameStall { cmd, .. }
            | EncodeError::Timeout { cmd, .. }
            | EncodeError::EncoderReported { cmd, .. }
            | EncodeError::RequiresFullReencode { cmd, .. }
            | EncodeError::ExitStatus { cmd, .. }
            | EncodeError::Unknown { cmd, .. } => Some(cmd),
            _ => None,
        }
    }

    /// The captured encoder output of the failed invocation, when captured.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            EncodeError::FrameStall { output, .. }
            | EncodeError::Timeout { output, .. }
            | EncodeError::EncoderReported { output, .. }
            | EncodeError::RequiresFullReencode { output, .. }
            | EncodeError::ExitStatus { output, .. }
            | EncodeError::Unknown { output, .. } => Some(output),
            _ => None,
        }
    }
}
