//! Option synthesis: flatten a decision set into an [`EncodeSpec`].
//!
//! Pure, deterministic, order-preserving. Output-stream ordering is
//! video, then audio in selection order, then subtitles in selection
//! order; the encoder addresses streams positionally, so nothing here
//! may reorder.

use crate::config::Policy;
use crate::selection::{StreamDecisions, SubtitleExtract};
use mp4forge_encode::{
    AudioOptions, Disposition, EncodeSpec, SubtitleOptions, SubtitleSource, VideoOptions,
};

/// Muxing queue size. Some ffmpeg filters are mid-API-transition and
/// need the larger queue; harmless otherwise.
const MAX_MUXING_QUEUE_SIZE: &str = "2048";

/// Flatten `decisions` into the encoder invocation spec.
pub fn synthesize(decisions: &StreamDecisions, policy: &Policy) -> EncodeSpec {
    let mut pre_options: Vec<String> = Vec::new();
    if !decisions.uses_overlay {
        // fix_sub_duration makes overlaid picture subtitles flash for
        // under a second, so it only rides along when no overlay runs.
        pre_options.push("-fix_sub_duration".to_string());
    }
    pre_options.extend(policy.pre_options.iter().cloned());
    pre_options.extend(["-vsync".to_string(), policy.vsync.clone()]);
    pre_options.extend(decisions.hw_pre_options.iter().cloned());

    let v = &decisions.video;
    let mut filter_parts = Vec::new();
    if let Some(width) = v.width {
        filter_parts.push(format!("scale={width}:trunc(ow/a/2)*2"));
    }
    if let Some(burn) = &v.burn_filter {
        filter_parts.push(burn.clone());
    }
    let video = VideoOptions {
        map: if v.drop_map { None } else { Some(v.map) },
        codec: v.codec.clone(),
        bitrate: v.bitrate,
        crf: v.crf,
        max_rate: v.max_rate,
        min_rate: v.min_rate,
        buf_size: v.buf_size,
        profile: v.profile.clone(),
        pix_fmt: v.pix_fmt.clone(),
        level: v.level,
        filter: (!filter_parts.is_empty()).then(|| filter_parts.join(",")),
        filter_complex: v.overlay_filter.clone(),
    };

    let audio = decisions
        .audio
        .iter()
        .map(|a| AudioOptions {
            map: a.map,
            codec: a.codec.clone(),
            channels: a.channels,
            bitrate: a.bitrate,
            sample_rate: a.sample_rate,
            language: Some(a.language.clone()),
            filter: a.filter.clone(),
            bsf: a.bsf.clone(),
            strict: a.strict.clone(),
            disposition: if a.default {
                Disposition::Default
            } else {
                Disposition::None
            },
        })
        .collect();

    let mut subtitle: Vec<SubtitleOptions> = decisions
        .subtitle
        .iter()
        .map(|s| SubtitleOptions {
            source: SubtitleSource::Internal(s.map),
            codec: s.codec.clone(),
            language: Some(s.language.clone()),
            forced: s.forced,
            default: s.default,
        })
        .collect();
    for external in &decisions.external_subtitles {
        subtitle.push(SubtitleOptions {
            source: SubtitleSource::External {
                path: external.path.clone(),
                encoding: Some(policy.subtitle.encoding.clone()),
            },
            codec: policy.subtitle.codecs[0].clone(),
            language: Some(external.language.clone()),
            forced: false,
            default: false,
        });
    }

    let mut post_options: Vec<String> = vec![
        "-threads".to_string(),
        policy.threads.clone(),
        "-max_muxing_queue_size".to_string(),
        MAX_MUXING_QUEUE_SIZE.to_string(),
    ];
    post_options.extend(decisions.video_tag_options.iter().cloned());
    if policy.is_mp4() {
        // Fast-start layout hint so players can stream before the mux
        // index is fully downloaded.
        post_options.extend(["-movflags".to_string(), "faststart".to_string()]);
    }
    post_options.extend(policy.post_options.iter().cloned());

    EncodeSpec {
        format: Some(policy.format.clone()),
        pre_options,
        video: Some(video),
        audio,
        subtitle,
        post_options,
    }
}

/// Build the single-stream spec that rips one subtitle into a sidecar
/// file.
pub fn synthesize_extract(extract: &SubtitleExtract) -> EncodeSpec {
    EncodeSpec {
        format: Some(muxer_for_codec(&extract.codec).to_string()),
        pre_options: Vec::new(),
        video: None,
        audio: Vec::new(),
        subtitle: vec![SubtitleOptions {
            source: SubtitleSource::Internal(extract.map),
            codec: extract.codec.clone(),
            language: Some(extract.language.clone()),
            forced: extract.forced,
            default: false,
        }],
        post_options: Vec::new(),
    }
}

/// ffmpeg muxer name for a subtitle codec.
fn muxer_for_codec(codec: &str) -> &'static str {
    match codec.to_lowercase().as_str() {
        "ass" | "ssa" => "ass",
        "webvtt" => "webvtt",
        _ => "srt",
    }
}
