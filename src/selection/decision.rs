//! Per-stream decision records produced by the selection engine.

use serde::Serialize;
use std::path::PathBuf;

/// Decision for the output video stream.
#[derive(Debug, Clone, Serialize)]
pub struct VideoDecision {
    /// Source stream index.
    pub map: u32,
    /// Output codec, or `"copy"`.
    pub codec: String,
    /// Target bitrate in kbit/s (carried even for copy; unused there).
    pub bitrate: Option<u32>,
    /// Constant rate factor; replaces the bitrate target when set.
    pub crf: Option<u32>,
    /// Rate-control bounds in kbit/s.
    pub max_rate: Option<u32>,
    pub min_rate: Option<u32>,
    pub buf_size: Option<u32>,
    /// Downscale target width.
    pub width: Option<u32>,
    /// Codec profile override.
    pub profile: Option<String>,
    /// Pixel format override.
    pub pix_fmt: Option<String>,
    /// Level constraint for re-encodes.
    pub level: Option<f64>,
    /// Text subtitle burn-in filter (`subtitles=...`).
    pub burn_filter: Option<String>,
    /// Picture subtitle overlay graph (`-filter_complex`).
    pub overlay_filter: Option<String>,
    /// The overlay graph relabels the video stream, so no `-map` for it.
    pub drop_map: bool,
}

impl VideoDecision {
    /// Whether the video stream passes through unchanged.
    pub fn is_copy(&self) -> bool {
        self.codec == "copy"
    }
}

/// Decision for one output audio stream.
#[derive(Debug, Clone, Serialize)]
pub struct AudioDecision {
    /// Source stream index.
    pub map: u32,
    /// Output codec, or `"copy"`.
    pub codec: String,
    /// Output channel count (re-encode only).
    pub channels: Option<u32>,
    /// Target bitrate in kbit/s (re-encode only).
    pub bitrate: Option<u32>,
    /// Output sample rate in Hz (re-encode only).
    pub sample_rate: Option<u32>,
    /// Normalized language tag.
    pub language: String,
    /// Audio filter chain.
    pub filter: Option<String>,
    /// Bitstream filter.
    pub bsf: Option<String>,
    /// `-strict` value for experimental codec/container pairs.
    pub strict: Option<String>,
    /// First emitted stream gets the default disposition.
    pub default: bool,
}

/// Decision for one embedded output subtitle stream.
#[derive(Debug, Clone, Serialize)]
pub struct SubtitleDecision {
    /// Source stream index.
    pub map: u32,
    /// Output codec.
    pub codec: String,
    /// Normalized language tag.
    pub language: String,
    /// Forced disposition flag.
    pub forced: bool,
    /// Default disposition flag.
    pub default: bool,
}

/// A sidecar subtitle file to embed as an extra input.
#[derive(Debug, Clone, Serialize)]
pub struct ExternalSubtitle {
    /// Path to the sidecar file.
    pub path: PathBuf,
    /// Language derived from the file name.
    pub language: String,
}

/// A container subtitle stream to rip into its own file (embedding
/// disabled).
#[derive(Debug, Clone, Serialize)]
pub struct SubtitleExtract {
    /// Source stream index.
    pub map: u32,
    /// Output subtitle codec.
    pub codec: String,
    /// Normalized language tag.
    pub language: String,
    /// Whether the source stream was flagged forced.
    pub forced: bool,
    /// File extension for the sidecar.
    pub extension: String,
}

/// Full decision set for one conversion attempt.
#[derive(Debug, Clone, Serialize)]
pub struct StreamDecisions {
    pub video: VideoDecision,
    pub audio: Vec<AudioDecision>,
    pub subtitle: Vec<SubtitleDecision>,
    /// Sidecar files to embed after the internal streams.
    pub external_subtitles: Vec<ExternalSubtitle>,
    /// Streams to rip into sidecar files in secondary conversions.
    pub extracts: Vec<SubtitleExtract>,
    /// Hardware decode options for the front of the invocation.
    pub hw_pre_options: Vec<String>,
    /// Codec tag options for copied streams (e.g. hvc1).
    pub video_tag_options: Vec<String>,
    /// A picture subtitle is composited over the video.
    pub uses_overlay: bool,
}
