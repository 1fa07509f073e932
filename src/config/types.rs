use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub video: VideoPolicy,

    #[serde(default)]
    pub audio: AudioPolicy,

    #[serde(default)]
    pub subtitle: SubtitlePolicy,

    #[serde(default)]
    pub process: ProcessConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Path to ffmpeg; found on PATH when unset.
    #[serde(default)]
    pub ffmpeg: Option<PathBuf>,

    /// Path to ffprobe; found on PATH when unset.
    #[serde(default)]
    pub ffprobe: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Output container format passed to the encoder.
    #[serde(default = "default_format")]
    pub format: String,

    /// Output file extension.
    #[serde(default = "default_format")]
    pub extension: String,

    /// Directory for converted files; next to the source when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Delete the source file after a successful conversion.
    #[serde(default = "default_true")]
    pub delete_source: bool,

    /// Also process files already in the output container.
    #[serde(default)]
    pub process_same_container: bool,

    /// Re-encode every stream regardless of compatibility.
    #[serde(default)]
    pub force_convert: bool,

    /// Accept m2ts sources (disabled by default; they tend to need
    /// special handling).
    #[serde(default)]
    pub handle_m2ts: bool,

    /// Permissions applied to created files (Unix only).
    #[serde(default = "default_permissions")]
    pub permissions: u32,
}

fn default_format() -> String {
    "mp4".to_string()
}
fn default_true() -> bool {
    true
}
fn default_permissions() -> u32 {
    0o777
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            extension: default_format(),
            dir: None,
            delete_source: true,
            process_same_container: false,
            force_convert: false,
            handle_m2ts: false,
            permissions: default_permissions(),
        }
    }
}

/// One row of a resolution-tiered rate table: the value applies to
/// sources no wider than `max_width`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RateTier {
    pub max_width: u32,
    pub kbps: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoPolicy {
    /// Accepted codecs; first entry is the re-encode target.
    #[serde(default = "default_video_codecs")]
    pub codecs: Vec<String>,

    /// Bitrate ceilings keyed by resolution tier, ascending by width.
    #[serde(default)]
    pub bitrate_ceilings: Vec<RateTier>,

    /// Fixed target bitrate in kbit/s; overrides estimation.
    #[serde(default)]
    pub bitrate: Option<u32>,

    /// Constant rate factor; replaces the bitrate target when set.
    #[serde(default)]
    pub crf: Option<u32>,

    /// Maximum output width; wider sources are downscaled.
    #[serde(default)]
    pub max_width: Option<u32>,

    /// Accepted codec profiles (lowercased, no spaces); first entry is
    /// the re-encode target.
    #[serde(default)]
    pub profiles: Vec<String>,

    /// Accepted pixel formats; first entry is the re-encode target.
    #[serde(default)]
    pub pix_fmts: Vec<String>,

    /// Maximum H.264 level for copied streams (e.g. 4.1).
    #[serde(default)]
    pub h264_max_level: Option<f64>,

    /// Rate-control bounds keyed by resolution tier.
    #[serde(default)]
    pub max_rate: Vec<RateTier>,
    #[serde(default)]
    pub min_rate: Vec<RateTier>,
    #[serde(default)]
    pub buf_size: Vec<RateTier>,

    /// Hardware decode eligibility.
    #[serde(default)]
    pub hw_decode: HwDecodeConfig,
}

fn default_video_codecs() -> Vec<String> {
    vec!["h264".to_string(), "x264".to_string()]
}

impl Default for VideoPolicy {
    fn default() -> Self {
        Self {
            codecs: default_video_codecs(),
            bitrate_ceilings: Vec::new(),
            bitrate: None,
            crf: None,
            max_width: None,
            profiles: Vec::new(),
            pix_fmts: Vec::new(),
            h264_max_level: None,
            max_rate: Vec::new(),
            min_rate: Vec::new(),
            buf_size: Vec::new(),
            hw_decode: HwDecodeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HwDecodeConfig {
    /// DXVA2 decoding; falls back to CPU on unsupported files by itself.
    #[serde(default)]
    pub dxva2: bool,

    /// QSV decoding for H.264 sources when encoding with h264qsv.
    #[serde(default)]
    pub qsv: bool,

    /// QSV decoding for HEVC sources.
    #[serde(default)]
    pub qsv_hevc: bool,

    /// NVDEC/CUVID decoding.
    #[serde(default)]
    pub cuvid: bool,

    /// Allow CUVID for HEVC/VP9 sources as well.
    #[serde(default)]
    pub cuvid_hevc: bool,

    /// GPU index for CUVID decoding.
    #[serde(default)]
    pub cuvid_gpu: Option<u32>,

    /// GPU index for CUVID HEVC/VP9 decoding.
    #[serde(default)]
    pub cuvid_hevc_gpu: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioPolicy {
    /// Accepted codecs; first entry is the re-encode target.
    #[serde(default = "default_audio_codecs")]
    pub codecs: Vec<String>,

    /// Target bitrate per channel in kbit/s. Zero means follow the
    /// source stream bitrate.
    #[serde(default = "default_audio_bitrate")]
    pub bitrate_per_channel: u32,

    /// Cap on output channels; wider sources are re-encoded down.
    #[serde(default)]
    pub max_channels: Option<u32>,

    /// Language whitelist (ISO 639-2); empty keeps every language.
    #[serde(default)]
    pub languages: Vec<String>,

    /// Language substituted for streams tagged `und`.
    #[serde(default)]
    pub default_language: Option<String>,

    /// Output sample rate; source rate when unset.
    #[serde(default)]
    pub sample_rate: Option<u32>,

    /// Audio filter applied to re-encoded streams.
    #[serde(default)]
    pub filter: Option<String>,

    /// Keep a copy of the original stream next to a re-encoded one.
    #[serde(default)]
    pub copy_original: bool,

    /// Apply the aac_adtstoasc bitstream filter to copied AAC streams.
    #[serde(default)]
    pub adts_to_asc: bool,

    /// Derived stereo compatibility stream.
    #[serde(default)]
    pub compat: CompatAudioConfig,
}

fn default_audio_codecs() -> Vec<String> {
    vec!["ac3".to_string()]
}
fn default_audio_bitrate() -> u32 {
    256
}

impl Default for AudioPolicy {
    fn default() -> Self {
        Self {
            codecs: default_audio_codecs(),
            bitrate_per_channel: default_audio_bitrate(),
            max_channels: None,
            languages: Vec::new(),
            default_language: None,
            sample_rate: None,
            filter: None,
            copy_original: false,
            adts_to_asc: false,
            compat: CompatAudioConfig::default(),
        }
    }
}

/// Settings for the derived stereo stream kept for players that only
/// handle two-channel AAC.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CompatAudioConfig {
    /// Codecs for the derived stream; empty disables it.
    #[serde(default)]
    pub codecs: Vec<String>,

    /// Derive only from the first audio stream.
    #[serde(default)]
    pub first_only: bool,

    /// Insert the derived stream after the primary instead of before.
    #[serde(default)]
    pub insert_last: bool,

    /// Audio filter for the derived stream.
    #[serde(default)]
    pub filter: Option<String>,
}

impl CompatAudioConfig {
    pub fn enabled(&self) -> bool {
        !self.codecs.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubtitlePolicy {
    /// Accepted codecs; first entry is the embed target.
    #[serde(default = "default_subtitle_codecs")]
    pub codecs: Vec<String>,

    /// Language whitelist (ISO 639-2); empty keeps every language.
    #[serde(default)]
    pub languages: Vec<String>,

    /// Language substituted for streams tagged `und`.
    #[serde(default)]
    pub default_language: Option<String>,

    /// Character encoding assumed for text subtitle input.
    #[serde(default = "default_subtitle_encoding")]
    pub encoding: String,

    /// Embed subtitles into the output container; extract to sidecar
    /// files when disabled.
    #[serde(default = "default_true")]
    pub embed: bool,

    /// Only embed streams already inside the source (skip sidecars).
    #[serde(default = "default_true")]
    pub embed_only_internal: bool,

    /// Burn the forced subtitle into the video pixels.
    #[serde(default)]
    pub burn_in_forced: bool,
}

fn default_subtitle_codecs() -> Vec<String> {
    vec!["mov_text".to_string()]
}
fn default_subtitle_encoding() -> String {
    "utf-8".to_string()
}

impl Default for SubtitlePolicy {
    fn default() -> Self {
        Self {
            codecs: default_subtitle_codecs(),
            languages: Vec::new(),
            default_language: None,
            encoding: default_subtitle_encoding(),
            embed: true,
            embed_only_internal: true,
            burn_in_forced: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessConfig {
    /// Encoder thread count (`auto` lets the encoder decide).
    #[serde(default = "default_threads")]
    pub threads: String,

    /// `-vsync` value passed to the encoder.
    #[serde(default = "default_vsync")]
    pub vsync: String,

    /// Hard budget in seconds for one silent read cycle; unset disables
    /// the responsiveness check.
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,

    /// Concurrent conversions for batch runs; CPU count when unset.
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Extra options placed before the input.
    #[serde(default)]
    pub pre_options: Vec<String>,

    /// Extra options placed after the stream options.
    #[serde(default)]
    pub post_options: Vec<String>,
}

fn default_threads() -> String {
    "auto".to_string()
}
fn default_vsync() -> String {
    "-1".to_string()
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            vsync: default_vsync(),
            read_timeout_secs: None,
            jobs: None,
            pre_options: Vec::new(),
            post_options: Vec::new(),
        }
    }
}

/// Immutable snapshot of the decision-relevant config sections, passed
/// into each selection pass. Conversions running in parallel can carry
/// different policies (the forced-re-encode retry does exactly that).
#[derive(Debug, Clone)]
pub struct Policy {
    pub format: String,
    pub video: VideoPolicy,
    pub audio: AudioPolicy,
    pub subtitle: SubtitlePolicy,
    pub threads: String,
    pub vsync: String,
    pub pre_options: Vec<String>,
    pub post_options: Vec<String>,
    pub force_convert: bool,
}

impl Config {
    /// Snapshot the decision-relevant sections into a [`Policy`].
    pub fn policy(&self) -> Policy {
        Policy {
            format: self.output.format.clone(),
            video: self.video.clone(),
            audio: self.audio.clone(),
            subtitle: self.subtitle.clone(),
            threads: self.process.threads.clone(),
            vsync: self.process.vsync.clone(),
            pre_options: self.process.pre_options.clone(),
            post_options: self.process.post_options.clone(),
            force_convert: self.output.force_convert,
        }
    }
}

impl Policy {
    /// Whether the output container is MP4 (several codec rules hinge on
    /// this).
    pub fn is_mp4(&self) -> bool {
        self.format.eq_ignore_ascii_case("mp4")
    }
}
