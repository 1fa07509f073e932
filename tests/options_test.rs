//! Option synthesis integration tests.

mod common;

use common::*;
use mp4forge::{options, selection};
use mp4forge_probe::{ForcedSignal, Stream};
use std::path::Path;

#[test]
fn argv_orders_streams_positionally() {
    let info = media_info(
        vec![
            Stream::Video(video_stream("h264", 1920, 1080)),
            Stream::Audio(audio_stream(1, "dts", 6, Some("eng"))),
            Stream::Audio(audio_stream(2, "ac3", 2, Some("jpn"))),
            Stream::Subtitle(subtitle_stream(3, Some("eng"), ForcedSignal::None, false)),
        ],
        Some(6_000_000.0),
    );
    let policy = base_policy();
    let decisions = selection::select(&info, &policy, &layout()).unwrap();
    let spec = options::synthesize(&decisions, &policy);

    let args = spec.to_args(Path::new("in.mkv"), Path::new("out.mp4"));
    let joined = args.join(" ");

    // Video first, audio in selection order, then subtitles.
    let video = joined.find("-c:v copy").expect("video options missing");
    let audio0 = joined.find("-c:a:0 ac3").expect("first audio missing");
    let audio1 = joined.find("-c:a:1 copy").expect("second audio missing");
    let subtitle = joined.find("-c:s:0 mov_text").expect("subtitle missing");
    assert!(video < audio0 && audio0 < audio1 && audio1 < subtitle);

    // Stream maps address source container indexes.
    assert!(joined.contains("-map 0:0"));
    assert!(joined.contains("-map 0:1"));
    assert!(joined.contains("-map 0:2"));
    assert!(joined.contains("-map 0:3"));

    // Disposition: first audio default, the rest none.
    assert!(joined.contains("-disposition:a:0 default"));
    assert!(joined.contains("-disposition:a:1 none"));

    // Language metadata rides along per stream.
    assert!(joined.contains("-metadata:s:a:0 language=eng"));
    assert!(joined.contains("-metadata:s:a:1 language=jpn"));
}

#[test]
fn container_constants_are_present() {
    let info = media_info(
        vec![
            Stream::Video(video_stream("h264", 1920, 1080)),
            Stream::Audio(audio_stream(1, "ac3", 6, Some("eng"))),
        ],
        Some(6_000_000.0),
    );
    let policy = base_policy();
    let decisions = selection::select(&info, &policy, &layout()).unwrap();
    let spec = options::synthesize(&decisions, &policy);
    let joined = spec
        .to_args(Path::new("in.mkv"), Path::new("out.mp4"))
        .join(" ");

    assert!(joined.starts_with("-fix_sub_duration"));
    assert!(joined.contains("-vsync -1"));
    assert!(joined.contains("-threads auto"));
    assert!(joined.contains("-max_muxing_queue_size 2048"));
    assert!(joined.contains("-movflags faststart"));
    assert!(joined.contains("-f mp4"));
    assert!(joined.ends_with("-y out.mp4"));
}

#[test]
fn non_mp4_outputs_skip_faststart() {
    let info = media_info(
        vec![
            Stream::Video(video_stream("h264", 1920, 1080)),
            Stream::Audio(audio_stream(1, "ac3", 6, Some("eng"))),
        ],
        Some(6_000_000.0),
    );
    let mut policy = base_policy();
    policy.format = "mkv".to_string();
    let decisions = selection::select(&info, &policy, &layout()).unwrap();
    let spec = options::synthesize(&decisions, &policy);
    let joined = spec
        .to_args(Path::new("in.mkv"), Path::new("out.mkv"))
        .join(" ");

    assert!(!joined.contains("-movflags"));
    assert!(joined.contains("-f mkv"));
}

#[test]
fn overlay_drops_the_video_map_and_sub_duration_fix() {
    let info = media_info(
        vec![
            Stream::Video(video_stream("h264", 3840, 2160)),
            Stream::Audio(audio_stream(1, "ac3", 6, Some("eng"))),
            Stream::Subtitle({
                let mut s = image_subtitle_stream(2, Some("eng"));
                s.forced = ForcedSignal::Disposition;
                s
            }),
        ],
        Some(6_000_000.0),
    );
    let mut policy = base_policy();
    policy.video.max_width = Some(1920);
    policy.subtitle.languages = vec!["eng".to_string()];
    policy.subtitle.burn_in_forced = true;

    let decisions = selection::select(&info, &policy, &layout()).unwrap();
    let spec = options::synthesize(&decisions, &policy);
    let args = spec.to_args(Path::new("in.mkv"), Path::new("out.mp4"));
    let joined = args.join(" ");

    assert!(!joined.contains("-fix_sub_duration"));
    assert!(joined.contains("-filter_complex"));
    // The relabeled video stream must not also be mapped by index.
    assert!(!joined.contains("-map 0:0 -c:v"));
}

#[test]
fn burned_text_subtitles_combine_with_scaling() {
    let info = media_info(
        vec![
            Stream::Video(video_stream("h264", 3840, 2160)),
            Stream::Audio(audio_stream(1, "ac3", 6, Some("eng"))),
            Stream::Subtitle(subtitle_stream(2, Some("eng"), ForcedSignal::Disposition, false)),
        ],
        Some(6_000_000.0),
    );
    let mut policy = base_policy();
    policy.video.max_width = Some(1920);
    policy.subtitle.languages = vec!["eng".to_string()];
    policy.subtitle.burn_in_forced = true;

    let decisions = selection::select(&info, &policy, &layout()).unwrap();
    let spec = options::synthesize(&decisions, &policy);
    let video = spec.video.as_ref().unwrap();
    let filter = video.filter.as_deref().expect("expected a -vf chain");

    let scale = filter.find("scale=1920").expect("scale step missing");
    let burn = filter.find("subtitles=").expect("burn step missing");
    assert!(scale < burn, "scaling must run before the burn: {filter}");
}

#[test]
fn extract_spec_is_single_stream() {
    let info = media_info(
        vec![
            Stream::Video(video_stream("h264", 1920, 1080)),
            Stream::Audio(audio_stream(1, "ac3", 6, Some("eng"))),
            Stream::Subtitle(subtitle_stream(2, Some("eng"), ForcedSignal::None, false)),
        ],
        Some(6_000_000.0),
    );
    let mut policy = base_policy();
    policy.subtitle.embed = false;
    policy.subtitle.codecs = vec!["srt".to_string()];

    let decisions = selection::select(&info, &policy, &layout()).unwrap();
    assert_eq!(decisions.extracts.len(), 1);

    let spec = options::synthesize_extract(&decisions.extracts[0]);
    let args = spec.to_args(Path::new("in.mkv"), Path::new("out.eng.srt"));
    let joined = args.join(" ");

    assert!(spec.video.is_none());
    assert!(joined.contains("-map 0:2"));
    assert!(joined.contains("-c:s:0 srt"));
    assert!(joined.contains("-f srt"));
    assert!(!joined.contains("-c:v"));
    assert!(!joined.contains("-c:a"));
}
