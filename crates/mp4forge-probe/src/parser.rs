//! Line-oriented parser for ffprobe `-show_format -show_streams` output.
//!
//! The input is a sequence of `[STREAM]`/`[FORMAT]` delimited `key=value`
//! blocks. Parsing is tolerant: unknown keys are ignored and malformed
//! numeric values fall back to defaults instead of aborting the parse.

use crate::types::*;

/// Title phrasings that mark a subtitle track as forced. Not standardized
/// at all; collected from files seen in the wild.
const FORCED_TITLE_PHRASES: &[&str] = &[
    "forced",
    "english subs for non-english parts",
    "force",
    "non-english parts",
    "foreign parts only",
    "non english parts",
    "non english part",
    "foreign parts",
    "valyrian",
    "dothraki",
];

/// Parse raw ffprobe text output into a [`MediaInfo`].
///
/// Returns `None` when neither a container format nor any stream could be
/// identified.
pub fn parse(raw: &str) -> Option<MediaInfo> {
    let mut format = FormatInfo::default();
    let mut streams = Vec::new();
    let mut in_format = false;
    let mut current: Option<RawStream> = None;

    for line in raw.lines() {
        let line = line.trim();
        match line {
            "" => continue,
            "[STREAM]" => current = Some(RawStream::default()),
            "[/STREAM]" => {
                if let Some(stream) = current.take().and_then(RawStream::finish) {
                    streams.push(stream);
                }
            }
            "[FORMAT]" => in_format = true,
            "[/FORMAT]" => in_format = false,
            _ => {
                let Some((key, val)) = line.split_once('=') else {
                    continue;
                };
                let (key, val) = (key.trim(), val.trim());
                if let Some(stream) = current.as_mut() {
                    stream.apply(key, val);
                } else if in_format {
                    apply_format_key(&mut format, key, val);
                }
            }
        }
    }

    if format.name.is_none() && streams.is_empty() {
        return None;
    }
    Some(MediaInfo { format, streams })
}

fn apply_format_key(format: &mut FormatInfo, key: &str, val: &str) {
    match key {
        "format_name" => format.name = Some(val.to_string()),
        "format_long_name" => format.long_name = Some(val.to_string()),
        "bit_rate" => format.bit_rate = val.parse().ok(),
        "duration" => format.duration = val.parse().ok(),
        "size" => format.size = val.parse().ok(),
        _ => {}
    }
}

/// Lenient float parse: malformed values fail soft to the default.
fn parse_float(val: &str, default: f64) -> f64 {
    val.parse().unwrap_or(default)
}

/// Lenient integer parse: malformed values fail soft to the default.
fn parse_int(val: &str, default: u32) -> u32 {
    val.parse().unwrap_or(default)
}

/// Parse a frame rate expressed as `"N/D"` or a bare decimal.
///
/// Both numerator and denominator must be positive for the rational form;
/// `"0/0"` (common for streams without a rate) yields `None`.
pub(crate) fn parse_frame_rate(val: &str) -> Option<f64> {
    if let Some((n, d)) = val.split_once('/') {
        let n = parse_float(n, 0.0);
        let d = parse_float(d, 0.0);
        if n > 0.0 && d > 0.0 {
            return Some(n / d);
        }
        return None;
    }
    let rate = parse_float(val, 0.0);
    (rate > 0.0).then_some(rate)
}

fn title_suggests_forced(title: &str) -> bool {
    FORCED_TITLE_PHRASES.contains(&title)
        || title.contains("forced")
        || title.contains("alien only")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

/// Accumulator for one `[STREAM]` block. Keys arrive in container order;
/// type-specific keys are no-ops until `codec_type` has been seen.
#[derive(Default)]
struct RawStream {
    kind: Option<StreamKind>,
    index: u32,
    codec: Option<String>,
    bit_rate: Option<u64>,
    width: u32,
    height: u32,
    fps: Option<f64>,
    level: Option<f64>,
    pix_fmt: Option<String>,
    profile: Option<String>,
    channels: u32,
    sample_rate: Option<u32>,
    attached_pic: bool,
    language: Option<String>,
    title: Option<String>,
    forced: ForcedSignal,
    default: bool,
    duration_hint: Option<String>,
}

impl RawStream {
    fn apply(&mut self, key: &str, val: &str) {
        match key {
            "index" => self.index = parse_int(val, 0),
            "codec_type" => {
                self.kind = match val {
                    "video" => Some(StreamKind::Video),
                    "audio" => Some(StreamKind::Audio),
                    "subtitle" => Some(StreamKind::Subtitle),
                    _ => None,
                }
            }
            "codec_name" => self.codec = Some(val.to_string()),
            "bit_rate" => self.bit_rate = val.parse().ok(),
            "width" => self.width = parse_int(val, 0),
            "height" => self.height = parse_int(val, 0),
            "channels" => self.channels = parse_int(val, 0),
            "sample_rate" => self.sample_rate = Some(parse_float(val, 0.0) as u32),
            "profile" => self.profile = Some(val.to_string()),
            "DISPOSITION:attached_pic" => self.attached_pic = parse_int(val, 0) == 1,
            "DISPOSITION:default" => self.default = parse_int(val, 0) == 1,
            _ => {}
        }

        if let Some(tag) = key.strip_prefix("TAG:") {
            self.apply_tag(&tag.to_lowercase(), val);
        }

        match self.kind {
            Some(StreamKind::Video) => match key {
                "r_frame_rate" => self.fps = parse_frame_rate(val),
                "level" => self.level = Some(parse_float(val, 0.0)),
                "pix_fmt" => self.pix_fmt = Some(val.to_string()),
                _ => {}
            },
            Some(StreamKind::Subtitle) => match key {
                // Explicit forced disposition outranks any title guess.
                "DISPOSITION:forced" => {
                    if parse_int(val, 0) == 1 {
                        self.forced = ForcedSignal::Disposition;
                    }
                }
                // Sometimes two same-language tracks differ only in
                // duration; the much shorter one tends to be the forced
                // track. Keep the raw text for a later cross-stream
                // comparison.
                "duration" if val != "N/A" => {
                    self.duration_hint = Some(val.to_string());
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn apply_tag(&mut self, tag: &str, val: &str) {
        match tag {
            "language" => self.language = Some(val.trim().to_lowercase()),
            "title" => {
                self.title = Some(val.to_string());
                // Some files only mention in the title that a subtitle
                // track is forced; a weaker signal than the disposition.
                if self.kind == Some(StreamKind::Subtitle) {
                    let lowered = val.trim().to_lowercase();
                    tracing::debug!(title = %lowered, "subtitle title");
                    if title_suggests_forced(&lowered) && self.forced < ForcedSignal::Title {
                        self.forced = ForcedSignal::Title;
                    }
                }
            }
            _ => {}
        }
    }

    /// Convert into a typed stream. Blocks whose type never became known
    /// are dropped.
    fn finish(self) -> Option<Stream> {
        let codec = self.codec.unwrap_or_default();
        match self.kind? {
            StreamKind::Video => Some(Stream::Video(VideoStream {
                index: self.index,
                codec,
                width: self.width,
                height: self.height,
                fps: self.fps,
                level: self.level,
                pix_fmt: self.pix_fmt,
                profile: self.profile,
                bit_rate: self.bit_rate,
                attached_pic: self.attached_pic,
            })),
            StreamKind::Audio => Some(Stream::Audio(AudioStream {
                index: self.index,
                codec,
                channels: self.channels,
                sample_rate: self.sample_rate,
                bit_rate: self.bit_rate,
                language: self.language,
                title: self.title,
                default: self.default,
            })),
            StreamKind::Subtitle => Some(Stream::Subtitle(SubtitleStream {
                index: self.index,
                codec,
                language: self.language,
                title: self.title,
                forced: self.forced,
                default: self.default,
                duration_hint: self.duration_hint,
            })),
        }
    }
}
