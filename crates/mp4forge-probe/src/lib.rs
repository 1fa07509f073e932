//! # mp4forge-probe
//!
//! Typed media metadata model and ffprobe output parsing.
//!
//! This crate runs `ffprobe -show_format -show_streams` against a source
//! file and parses its `[STREAM]`/`[FORMAT]` key=value text blocks into a
//! [`MediaInfo`] snapshot: one [`FormatInfo`] plus an ordered list of
//! [`Stream`] records (video / audio / subtitle).
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! let info = mp4forge_probe::probe_file(Path::new("ffprobe"), Path::new("movie.mkv"))?;
//! if let Some(video) = info.video() {
//!     println!("Video: {} {}x{}", video.codec, video.width, video.height);
//! }
//! for audio in info.audio() {
//!     println!("Audio: {} {}ch", audio.codec, audio.channels);
//! }
//! # Ok::<(), mp4forge_probe::ProbeError>(())
//! ```

mod error;
pub mod parser;
pub mod types;

pub use error::{ProbeError, Result};
pub use parser::parse;
pub use types::{
    AudioStream, ForcedSignal, FormatInfo, MediaInfo, Stream, SubtitleStream, VideoStream,
};

use std::path::Path;
use std::process::Command;

/// Probe a media file with ffprobe and parse the result.
///
/// `ffprobe` is the path to the ffprobe executable; generous analyze and
/// probe limits are passed so that streams late in large containers are
/// still reported.
///
/// # Errors
///
/// Returns [`ProbeError::FileNotFound`] when the input does not exist,
/// [`ProbeError::ToolNotFound`] when ffprobe cannot be spawned, and
/// [`ProbeError::Unrecognized`] when the output contained neither a
/// format nor any stream.
pub fn probe_file(ffprobe: &Path, input: &Path) -> Result<MediaInfo> {
    if !input.exists() {
        return Err(ProbeError::FileNotFound {
            path: input.to_path_buf(),
        });
    }

    let output = Command::new(ffprobe)
        .args([
            "-analyzeduration",
            "9999999999",
            "-probesize",
            "1999999999",
            "-show_format",
            "-show_streams",
        ])
        .arg(input)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProbeError::tool_not_found(ffprobe.display().to_string())
            } else {
                ProbeError::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(status = ?output.status, "ffprobe reported failure");
        return Err(ProbeError::tool_failed("ffprobe", stderr.trim().to_string()));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    parse(&text).ok_or_else(|| ProbeError::Unrecognized {
        path: input.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_error() {
        let result = probe_file(Path::new("ffprobe"), Path::new("/nonexistent/file.mkv"));
        assert!(matches!(result, Err(ProbeError::FileNotFound { .. })));
    }
}
