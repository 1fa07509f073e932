//! Stream selection engine.
//!
//! Consumes a probed [`MediaInfo`] snapshot plus an immutable [`Policy`]
//! and decides, per stream, whether to pass through unchanged or
//! re-encode, computing every derived parameter along the way. The
//! result is a [`StreamDecisions`] set for the option synthesizer; no
//! I/O is performed here beyond the optional sidecar subtitle scan.

mod audio;
mod decision;
mod hwaccel;
mod lang;
mod subtitle;
mod video;

pub use decision::*;

use crate::config::Policy;
use crate::layout::FileLayout;
use anyhow::{Context, Result};
use mp4forge_probe::MediaInfo;

/// Image-based subtitle codecs. These cannot be embedded as text tracks;
/// they are composited over the video when burning is requested and left
/// untouched otherwise.
pub const IMAGE_SUBTITLE_CODECS: &[&str] = &[
    "hdmv_pgs_subtitle",
    "pgssub",
    "dvd_subtitle",
    "dvdsub",
    "dvb_subtitle",
    "xsub",
];

/// Decide the transform policy for every stream of `info`.
pub fn select(info: &MediaInfo, policy: &Policy, layout: &FileLayout) -> Result<StreamDecisions> {
    let video_stream = info
        .video()
        .context("Source has no video stream")?;
    tracing::info!(codec = %video_stream.codec, "video codec detected");

    let mut video = video::select_video(info, video_stream, policy);

    let relaxation = audio::whitelist_relaxation(info, &policy.audio);
    if relaxation.relaxed {
        tracing::info!(
            "no audio stream in an appropriate language, relaxing restrictions so some audio survives"
        );
    }

    let audio = audio::select_audio(info, policy, &relaxation);
    let subtitles = subtitle::select_subtitles(info, policy, &relaxation, layout, &mut video);

    let hw_pre_options = hwaccel::decode_options(
        video_stream,
        &policy.video.hw_decode,
        &video,
        subtitles.burned,
    );

    let mut video_tag_options = Vec::new();
    if video.is_copy() && matches!(video_stream.codec.to_lowercase().as_str(), "hevc" | "h265" | "x265")
    {
        tracing::info!("tagging copied video stream as hvc1");
        video_tag_options.extend(["-tag:v".to_string(), "hvc1".to_string()]);
    }

    Ok(StreamDecisions {
        uses_overlay: video.overlay_filter.is_some(),
        video,
        audio,
        subtitle: subtitles.decisions,
        external_subtitles: subtitles.externals,
        extracts: subtitles.extracts,
        hw_pre_options,
        video_tag_options,
    })
}

/// Normalize a container language tag: empty/missing becomes `und`, and
/// `und` is substituted with the configured default language when given.
pub(crate) fn normalize_language(tag: Option<&str>, default: Option<&str>) -> String {
    let tag = tag
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("und")
        .to_lowercase();
    if tag == "und" {
        if let Some(default) = default {
            return default.to_lowercase();
        }
    }
    tag
}

/// Whitelist membership; an empty whitelist keeps every language.
pub(crate) fn language_allowed(whitelist: &[String], language: &str) -> bool {
    whitelist.is_empty() || whitelist.iter().any(|l| l.eq_ignore_ascii_case(language))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_language_substitutes_default() {
        assert_eq!(normalize_language(None, None), "und");
        assert_eq!(normalize_language(Some("  "), None), "und");
        assert_eq!(normalize_language(Some("ENG"), None), "eng");
        assert_eq!(normalize_language(None, Some("eng")), "eng");
        assert_eq!(normalize_language(Some("und"), Some("eng")), "eng");
        assert_eq!(normalize_language(Some("jpn"), Some("eng")), "jpn");
    }

    #[test]
    fn empty_whitelist_allows_everything() {
        assert!(language_allowed(&[], "jpn"));
        assert!(language_allowed(&["eng".to_string()], "ENG"));
        assert!(!language_allowed(&["eng".to_string()], "jpn"));
    }
}
