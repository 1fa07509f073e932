//! Typed media metadata model.

use serde::{Deserialize, Serialize};

/// Container-level information for a probed file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatInfo {
    /// Format short name (e.g., "matroska,webm").
    pub name: Option<String>,
    /// Format descriptive name.
    pub long_name: Option<String>,
    /// Total container bitrate in bits per second.
    pub bit_rate: Option<f64>,
    /// Duration in seconds.
    pub duration: Option<f64>,
    /// File size in bytes.
    pub size: Option<f64>,
}

/// How strongly a subtitle stream is flagged as forced.
///
/// Ordering matters: an explicit disposition flag always outranks a
/// title-text guess.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ForcedSignal {
    /// No forced indication.
    #[default]
    None,
    /// The stream title suggests a forced track (last-resort signal).
    Title,
    /// The container disposition explicitly flags the track as forced.
    Disposition,
}

impl ForcedSignal {
    /// True for any non-`None` signal.
    pub fn is_forced(self) -> bool {
        self != ForcedSignal::None
    }
}

/// A video stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStream {
    /// Stream index inside the container (addressing key for stream maps).
    pub index: u32,
    /// Codec short name (e.g., "h264", "hevc").
    pub codec: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Average frames per second.
    pub fps: Option<f64>,
    /// Codec level as reported (e.g., 41 for H.264 level 4.1).
    pub level: Option<f64>,
    /// Pixel format (e.g., "yuv420p").
    pub pix_fmt: Option<String>,
    /// Codec profile (e.g., "High").
    pub profile: Option<String>,
    /// Stream bitrate in bits per second.
    pub bit_rate: Option<u64>,
    /// Whether this stream is an attached poster image.
    pub attached_pic: bool,
}

/// An audio stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStream {
    /// Stream index inside the container.
    pub index: u32,
    /// Codec short name (e.g., "aac", "ac3", "truehd").
    pub codec: String,
    /// Number of channels.
    pub channels: u32,
    /// Sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Stream bitrate in bits per second.
    pub bit_rate: Option<u64>,
    /// Language tag as found in the container, if any.
    pub language: Option<String>,
    /// Stream title, if any.
    pub title: Option<String>,
    /// Default disposition flag.
    pub default: bool,
}

/// A subtitle stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleStream {
    /// Stream index inside the container.
    pub index: u32,
    /// Codec short name (e.g., "subrip", "hdmv_pgs_subtitle").
    pub codec: String,
    /// Language tag as found in the container, if any.
    pub language: Option<String>,
    /// Stream title, if any.
    pub title: Option<String>,
    /// Forced indication, aggregated from disposition and title text.
    pub forced: ForcedSignal,
    /// Default disposition flag.
    pub default: bool,
    /// Raw `HH:MM:SS.fraction` duration text, kept verbatim for
    /// cross-stream comparison when disposition metadata is absent.
    pub duration_hint: Option<String>,
}

impl SubtitleStream {
    /// Parse the duration fingerprint into whole seconds.
    ///
    /// The fractional part is dropped. Returns `None` when the text is
    /// missing or not in `HH:MM:SS(.f)` form.
    pub fn duration_hint_secs(&self) -> Option<u64> {
        let text = self.duration_hint.as_deref()?;
        let mut parts = text.split(':');
        let hours: u64 = parts.next()?.parse().ok()?;
        let minutes: u64 = parts.next()?.parse().ok()?;
        let seconds: f64 = parts.next()?.parse().ok()?;
        if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
            return None;
        }
        Some(hours * 3600 + minutes * 60 + seconds as u64)
    }
}

/// One stream inside a media container.
///
/// Streams keep their container order; `index` values are unique and are
/// the addressing key used when building encoder stream maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Stream {
    Video(VideoStream),
    Audio(AudioStream),
    Subtitle(SubtitleStream),
}

impl Stream {
    /// Container index of the stream.
    pub fn index(&self) -> u32 {
        match self {
            Stream::Video(v) => v.index,
            Stream::Audio(a) => a.index,
            Stream::Subtitle(s) => s.index,
        }
    }

    /// Codec short name of the stream.
    pub fn codec(&self) -> &str {
        match self {
            Stream::Video(v) => &v.codec,
            Stream::Audio(a) => &a.codec,
            Stream::Subtitle(s) => &s.codec,
        }
    }
}

/// Immutable snapshot of one probed source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container-level information.
    pub format: FormatInfo,
    /// All streams in container order.
    pub streams: Vec<Stream>,
}

impl MediaInfo {
    /// The primary video stream (first video stream in container order).
    pub fn video(&self) -> Option<&VideoStream> {
        self.streams.iter().find_map(|s| match s {
            Stream::Video(v) => Some(v),
            _ => None,
        })
    }

    /// All audio streams in container order.
    pub fn audio(&self) -> impl Iterator<Item = &AudioStream> {
        self.streams.iter().filter_map(|s| match s {
            Stream::Audio(a) => Some(a),
            _ => None,
        })
    }

    /// All subtitle streams in container order.
    pub fn subtitles(&self) -> impl Iterator<Item = &SubtitleStream> {
        self.streams.iter().filter_map(|s| match s {
            Stream::Subtitle(s) => Some(s),
            _ => None,
        })
    }

    /// Attached poster images.
    pub fn posters(&self) -> impl Iterator<Item = &VideoStream> {
        self.streams.iter().filter_map(|s| match s {
            Stream::Video(v) if v.attached_pic => Some(v),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(duration_hint: Option<&str>) -> SubtitleStream {
        SubtitleStream {
            index: 2,
            codec: "subrip".to_string(),
            language: Some("eng".to_string()),
            title: None,
            forced: ForcedSignal::None,
            default: false,
            duration_hint: duration_hint.map(|s| s.to_string()),
        }
    }

    #[test]
    fn duration_hint_parses_hms() {
        assert_eq!(sub(Some("00:00:30.500000")).duration_hint_secs(), Some(30));
        assert_eq!(sub(Some("01:02:03.000000")).duration_hint_secs(), Some(3723));
    }

    #[test]
    fn duration_hint_rejects_odd_formats() {
        assert_eq!(sub(Some("90.5")).duration_hint_secs(), None);
        assert_eq!(sub(Some("1:2:3:4")).duration_hint_secs(), None);
        assert_eq!(sub(None).duration_hint_secs(), None);
    }

    #[test]
    fn forced_signal_ordering() {
        assert!(ForcedSignal::Disposition > ForcedSignal::Title);
        assert!(ForcedSignal::Title > ForcedSignal::None);
        assert!(!ForcedSignal::None.is_forced());
        assert!(ForcedSignal::Title.is_forced());
    }
}
