//! Video stream decision logic.

use super::decision::VideoDecision;
use crate::config::{Policy, RateTier};
use mp4forge_probe::{MediaInfo, VideoStream};

/// Encoder container/mux overhead margin applied to estimated bitrates.
/// Empirically tuned in production; do not re-derive.
const BITRATE_OVERHEAD_MARGIN: f64 = 0.95;

/// Look up a tiered rate value: walk ascending width thresholds and take
/// the first tier wide enough for the source.
pub(crate) fn rate_for_width(table: &[RateTier], width: u32) -> Option<u32> {
    table.iter().find(|t| t.max_width >= width).map(|t| t.kbps)
}

/// Estimate the video bitrate in kbit/s as the container bitrate minus
/// all audio stream bitrates, scaled by the overhead margin. Falls back
/// to the raw container bitrate when the audio share is unknown or
/// implausible.
pub(crate) fn estimate_bitrate(info: &MediaInfo) -> Option<u32> {
    let total = info.format.bit_rate?;
    let audio: u64 = info.audio().filter_map(|a| a.bit_rate).sum();
    let video = total - audio as f64;
    tracing::debug!(total, audio, estimated = video, "estimating video bitrate");

    if video > 0.0 {
        Some((video / 1000.0 * BITRATE_OVERHEAD_MARGIN) as u32)
    } else {
        Some((total / 1000.0) as u32)
    }
}

/// Decide copy vs. re-encode for the primary video stream and compute
/// the derived parameters.
pub(crate) fn select_video(info: &MediaInfo, v: &VideoStream, policy: &Policy) -> VideoDecision {
    let vp = &policy.video;
    let target = vp.codecs[0].clone();
    let codec_lc = v.codec.to_lowercase();

    let estimated = estimate_bitrate(info);
    let ceiling = vp
        .bitrate
        .or_else(|| rate_for_width(&vp.bitrate_ceilings, v.width));

    let mut codec = if vp.codecs.contains(&codec_lc) && !policy.force_convert {
        "copy".to_string()
    } else {
        target.clone()
    };
    let mut bitrate = ceiling.or(estimated);
    let mut pix_fmt = None;
    let mut profile = None;
    let mut width = None;

    if !vp.pix_fmts.is_empty() {
        let src = v.pix_fmt.as_deref().unwrap_or("").to_lowercase();
        if !vp.pix_fmts.contains(&src) {
            tracing::debug!(pix_fmt = %src, "pixel format not approved, stream can no longer be copied");
            codec = target.clone();
            pix_fmt = vp.pix_fmts.first().cloned();
            if !vp.profiles.is_empty() {
                profile = vp.profiles.first().cloned();
            }
        }
    }

    if let (Some(ceiling), Some(estimated)) = (ceiling, estimated) {
        if estimated > ceiling {
            tracing::debug!(estimated, ceiling, "source bitrate over the ceiling, re-encoding");
            codec = target.clone();
            bitrate = Some(ceiling);
        }
    }

    if let Some(max_width) = vp.max_width {
        if max_width < v.width {
            tracing::debug!(
                source = v.width,
                max_width,
                "source wider than the max width, downsampling"
            );
            codec = target.clone();
            width = Some(max_width);
        }
    }

    if codec_lc.contains("264") {
        if let (Some(max_level), Some(level)) = (vp.h264_max_level, v.level) {
            if level / 10.0 > max_level {
                tracing::info!(level = level / 10.0, max_level, "H.264 level too high to copy");
                codec = target.clone();
            }
        }
    }

    if !vp.profiles.is_empty() {
        let src = v
            .profile
            .as_deref()
            .unwrap_or("")
            .to_lowercase()
            .replace(' ', "");
        if !vp.profiles.contains(&src) {
            tracing::debug!(profile = %src, "video profile not supported, stream can no longer be copied");
            codec = target.clone();
            profile = vp.profiles.first().cloned();
            if !vp.pix_fmts.is_empty() {
                pix_fmt = vp.pix_fmts.first().cloned();
            }
        }
    }

    // yuv420 through nvenc shows aliasing; nv12 carries the same colors
    // without it.
    if codec == "nvenc_h264" && pix_fmt.as_deref() == Some("yuv420") {
        pix_fmt = Some("nv12".to_string());
    }

    tracing::debug!(codec = %codec, bitrate = ?bitrate, "video decision");

    VideoDecision {
        map: v.index,
        codec,
        bitrate,
        crf: vp.crf,
        max_rate: rate_for_width(&vp.max_rate, v.width),
        min_rate: rate_for_width(&vp.min_rate, v.width),
        buf_size: rate_for_width(&vp.buf_size, v.width),
        width,
        profile,
        pix_fmt,
        level: vp.h264_max_level,
        burn_filter: None,
        overlay_filter: None,
        drop_map: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> Vec<RateTier> {
        vec![
            RateTier {
                max_width: 1280,
                kbps: 5000,
            },
            RateTier {
                max_width: 1920,
                kbps: 8000,
            },
            RateTier {
                max_width: 3840,
                kbps: 20000,
            },
        ]
    }

    #[test]
    fn tier_walk_takes_first_threshold_at_least_width() {
        let table = tiers();
        assert_eq!(rate_for_width(&table, 1920), Some(8000));
        assert_eq!(rate_for_width(&table, 2000), Some(20000));
        assert_eq!(rate_for_width(&table, 640), Some(5000));
        assert_eq!(rate_for_width(&table, 7680), None);
    }
}
