//! Shared builders for integration tests.

#![allow(dead_code)]

use mp4forge::config::{Config, Policy};
use mp4forge::layout::FileLayout;
use mp4forge_probe::{
    AudioStream, ForcedSignal, FormatInfo, MediaInfo, Stream, SubtitleStream, VideoStream,
};
use std::path::Path;

pub fn video_stream(codec: &str, width: u32, height: u32) -> VideoStream {
    VideoStream {
        index: 0,
        codec: codec.to_string(),
        width,
        height,
        fps: Some(23.976),
        level: Some(41.0),
        pix_fmt: Some("yuv420p".to_string()),
        profile: Some("High".to_string()),
        bit_rate: None,
        attached_pic: false,
    }
}

pub fn audio_stream(index: u32, codec: &str, channels: u32, language: Option<&str>) -> AudioStream {
    AudioStream {
        index,
        codec: codec.to_string(),
        channels,
        sample_rate: Some(48_000),
        bit_rate: Some(640_000),
        language: language.map(|l| l.to_string()),
        title: None,
        default: false,
    }
}

pub fn subtitle_stream(
    index: u32,
    language: Option<&str>,
    forced: ForcedSignal,
    default: bool,
) -> SubtitleStream {
    SubtitleStream {
        index,
        codec: "subrip".to_string(),
        language: language.map(|l| l.to_string()),
        title: None,
        forced,
        default,
        duration_hint: None,
    }
}

pub fn image_subtitle_stream(index: u32, language: Option<&str>) -> SubtitleStream {
    SubtitleStream {
        index,
        codec: "hdmv_pgs_subtitle".to_string(),
        language: language.map(|l| l.to_string()),
        title: None,
        forced: ForcedSignal::None,
        default: false,
        duration_hint: None,
    }
}

/// Assemble a MediaInfo with the given streams and container bitrate.
pub fn media_info(streams: Vec<Stream>, bit_rate: Option<f64>) -> MediaInfo {
    MediaInfo {
        format: FormatInfo {
            name: Some("matroska,webm".to_string()),
            long_name: None,
            bit_rate,
            duration: Some(5400.0),
            size: None,
        },
        streams,
    }
}

pub fn base_policy() -> Policy {
    Config::default().policy()
}

pub fn layout() -> FileLayout {
    FileLayout::new(Path::new("/media/Movie.2021.mkv")).unwrap()
}
