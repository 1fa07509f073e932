//! # mp4forge-encode
//!
//! Encoder invocation specs and ffmpeg process supervision.
//!
//! This crate provides the two halves of driving an external encoder:
//!
//! - [`EncodeSpec`]: the ordered, CLI-style option spec produced by the
//!   decision layer (never a shell string), with its argv serialization.
//! - [`Supervisor`]: spawns ffmpeg for a spec, streams parsed
//!   [`ProgressEvent`]s from its stderr, detects frame stalls, honors a
//!   cooperative cancellation signal, and classifies terminal outcomes.
//!
//! ## Example
//!
//! ```no_run
//! use mp4forge_encode::{EncodeSpec, Supervisor};
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! let supervisor = Supervisor::new("ffmpeg");
//! let cancel = Arc::new(AtomicBool::new(false));
//! let spec = EncodeSpec::default();
//! let mut conversion = supervisor.convert(
//!     &spec,
//!     Path::new("in.mkv"),
//!     Path::new("out.mp4"),
//!     cancel,
//! )?;
//! for event in conversion.by_ref() {
//!     println!("at {:.1}s ({} fps)", event.timecode, event.fps);
//! }
//! let outcome = conversion.finish()?;
//! # let _ = outcome;
//! # Ok::<(), mp4forge_encode::EncodeError>(())
//! ```

mod error;
pub mod progress;
pub mod spec;
pub mod supervisor;
pub mod tools;

pub use error::{EncodeError, Result};
pub use progress::ProgressEvent;
pub use spec::{
    AudioOptions, Disposition, EncodeSpec, SubtitleOptions, SubtitleSource, VideoOptions,
};
pub use supervisor::{
    remove_with_retry, Conversion, EncodeOutcome, EncodeResult, Supervisor, SupervisorConfig,
    POLL_INTERVAL, STALL_BUDGET,
};
pub use tools::{check_tool, check_tools, get_tool_path, require_tool, ToolInfo};
