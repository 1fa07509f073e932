//! Hardware decode eligibility.
//!
//! Produces the decoder pre-options for an invocation. Eligibility
//! depends on the source codec and pixel format, on whether the video is
//! being re-encoded at all, and on whether a subtitle is being burned in
//! (full hardware surfaces cannot feed the compositing filters).

use super::decision::VideoDecision;
use crate::config::HwDecodeConfig;
use mp4forge_probe::VideoStream;

/// Source codecs the CUVID decoders handle.
const CUVID_CODECS: &[&str] = &[
    "h264",
    "mjpeg",
    "mpeg1video",
    "mpeg2video",
    "mpeg4",
    "vc1",
    "vp8",
    "hevc",
    "vp9",
];

/// Compute the hardware decode pre-options for this source/decision pair.
pub(crate) fn decode_options(
    v: &VideoStream,
    hw: &HwDecodeConfig,
    decision: &VideoDecision,
    subtitle_burned: bool,
) -> Vec<String> {
    let mut pre: Vec<String> = Vec::new();
    let codec = v.codec.to_lowercase();
    let pix_fmt = v.pix_fmt.as_deref().unwrap_or("");

    if hw.dxva2 {
        // DXVA2 falls back to CPU decoding by itself on files it cannot
        // handle, so no support check is needed.
        pre.extend(["-hwaccel".into(), "dxva2".into()]);
        return pre;
    }

    if codec == "hevc" && hw.qsv_hevc {
        pre.extend(["-vcodec".into(), "hevc_qsv".into()]);
        return pre;
    }

    if decision.codec == "h264qsv"
        && codec == "h264"
        && hw.qsv
        && v.level.map(|l| l / 10.0 < 5.0).unwrap_or(false)
    {
        pre.extend(["-vcodec".into(), "h264_qsv".into()]);
        return pre;
    }

    // CUVID only supports 4:2:0 chroma.
    if hw.cuvid
        && CUVID_CODECS.contains(&codec.as_str())
        && !decision.is_copy()
        && !pix_fmt.contains("422")
        && !pix_fmt.contains("444")
    {
        let hevc_family = codec == "hevc" || codec == "vp9";

        // 10/12-bit video must be copied back to system memory after
        // decoding, and burned-in subtitles need the frames there too.
        let full_hw = !pix_fmt.contains("10le") && !pix_fmt.contains("16le") && !subtitle_burned;
        if full_hw {
            pre.extend(["-hwaccel".into(), "cuvid".into()]);
            let device = if hevc_family { hw.cuvid_hevc_gpu } else { hw.cuvid_gpu };
            if let Some(device) = device {
                pre.extend(["-hwaccel_device".into(), device.to_string()]);
            }
        }

        let decoder = match codec.as_str() {
            "h264" => Some("h264_cuvid"),
            "mjpeg" => Some("mjpeg_cuvid"),
            "mpeg1video" => Some("mpeg1_cuvid"),
            "mpeg2video" => Some("mpeg2_cuvid"),
            "mpeg4" => Some("mpeg4_cuvid"),
            "vc1" => Some("vc1_cuvid"),
            "vp8" => Some("vp8_cuvid"),
            "hevc" if hw.cuvid_hevc => Some("hevc_cuvid"),
            "vp9" if hw.cuvid_hevc => Some("vp9_cuvid"),
            _ => None,
        };
        if let Some(decoder) = decoder {
            pre.extend(["-c:v".into(), decoder.into()]);
        }

        let gpu = if hevc_family { hw.cuvid_hevc_gpu } else { hw.cuvid_gpu };
        if let Some(gpu) = gpu {
            pre.extend(["-gpu".into(), gpu.to_string()]);
        }
    }

    pre
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(codec: &str, pix_fmt: &str, level: Option<f64>) -> VideoStream {
        VideoStream {
            index: 0,
            codec: codec.to_string(),
            width: 1920,
            height: 1080,
            fps: Some(23.976),
            level,
            pix_fmt: Some(pix_fmt.to_string()),
            profile: None,
            bit_rate: None,
            attached_pic: false,
        }
    }

    fn reencode(codec: &str) -> VideoDecision {
        VideoDecision {
            map: 0,
            codec: codec.to_string(),
            bitrate: None,
            crf: None,
            max_rate: None,
            min_rate: None,
            buf_size: None,
            width: None,
            profile: None,
            pix_fmt: None,
            level: None,
            burn_filter: None,
            overlay_filter: None,
            drop_map: false,
        }
    }

    #[test]
    fn dxva2_wins_unconditionally() {
        let hw = HwDecodeConfig {
            dxva2: true,
            cuvid: true,
            ..Default::default()
        };
        let pre = decode_options(&stream("h264", "yuv420p", None), &hw, &reencode("h264"), false);
        assert_eq!(pre, vec!["-hwaccel", "dxva2"]);
    }

    #[test]
    fn cuvid_skips_copy_jobs_and_wide_chroma() {
        let hw = HwDecodeConfig {
            cuvid: true,
            ..Default::default()
        };
        assert!(decode_options(&stream("h264", "yuv420p", None), &hw, &reencode("copy"), false)
            .is_empty());
        assert!(decode_options(
            &stream("h264", "yuv422p", None),
            &hw,
            &reencode("h264"),
            false
        )
        .is_empty());
    }

    #[test]
    fn ten_bit_sources_decode_without_full_hwaccel() {
        let hw = HwDecodeConfig {
            cuvid: true,
            ..Default::default()
        };
        let pre = decode_options(
            &stream("h264", "yuv420p10le", None),
            &hw,
            &reencode("h264"),
            false,
        );
        assert_eq!(pre, vec!["-c:v", "h264_cuvid"]);
    }

    #[test]
    fn burn_in_disables_full_hwaccel() {
        let hw = HwDecodeConfig {
            cuvid: true,
            ..Default::default()
        };
        let pre = decode_options(&stream("h264", "yuv420p", None), &hw, &reencode("h264"), true);
        assert_eq!(pre, vec!["-c:v", "h264_cuvid"]);
    }

    #[test]
    fn qsv_requires_level_below_five() {
        let hw = HwDecodeConfig {
            qsv: true,
            ..Default::default()
        };
        let pre = decode_options(
            &stream("h264", "yuv420p", Some(41.0)),
            &hw,
            &reencode("h264qsv"),
            false,
        );
        assert_eq!(pre, vec!["-vcodec", "h264_qsv"]);

        let pre = decode_options(
            &stream("h264", "yuv420p", Some(51.0)),
            &hw,
            &reencode("h264qsv"),
            false,
        );
        assert!(pre.is_empty());
    }
}
