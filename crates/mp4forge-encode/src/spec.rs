//! Encoder invocation specs.
//!
//! An [`EncodeSpec`] is the single contract between the decision layer and
//! the process supervisor: an ordered collection of CLI-style option
//! tuples, never a shell string. The supervisor only serializes the spec;
//! it never re-derives policy.

use std::path::{Path, PathBuf};

/// Disposition applied to an output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    /// Players should select this stream by default.
    Default,
    /// No special selection intent.
    #[default]
    None,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Default => "default",
            Disposition::None => "none",
        }
    }
}

/// Options for the single output video stream.
#[derive(Debug, Clone, Default)]
pub struct VideoOptions {
    /// Source stream index to map. `None` when a filter graph relabels
    /// the video stream (picture-subtitle overlay with scaling).
    pub map: Option<u32>,
    /// Output codec, or `"copy"`.
    pub codec: String,
    /// Target bitrate in kbit/s.
    pub bitrate: Option<u32>,
    /// Constant rate factor; replaces the bitrate target when set.
    pub crf: Option<u32>,
    /// Rate-control bounds in kbit/s.
    pub max_rate: Option<u32>,
    pub min_rate: Option<u32>,
    pub buf_size: Option<u32>,
    /// Codec profile.
    pub profile: Option<String>,
    /// Pixel format.
    pub pix_fmt: Option<String>,
    /// H.264 level.
    pub level: Option<f64>,
    /// Simple filter chain (`-vf`): scaling, text subtitle burn-in.
    pub filter: Option<String>,
    /// Complex filter graph (`-filter_complex`): picture subtitle overlay.
    pub filter_complex: Option<String>,
}

impl VideoOptions {
    /// Whether the video stream passes through unchanged.
    pub fn is_copy(&self) -> bool {
        self.codec == "copy"
    }
}

/// Options for one output audio stream.
#[derive(Debug, Clone, Default)]
pub struct AudioOptions {
    /// Source stream index to map.
    pub map: u32,
    /// Output codec, or `"copy"`.
    pub codec: String,
    /// Output channel count.
    pub channels: Option<u32>,
    /// Target bitrate in kbit/s.
    pub bitrate: Option<u32>,
    /// Output sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Language tag written to stream metadata.
    pub language: Option<String>,
    /// Audio filter chain.
    pub filter: Option<String>,
    /// Bitstream filter (e.g. `aac_adtstoasc`).
    pub bsf: Option<String>,
    /// `-strict` value for experimental codec/container pairs.
    pub strict: Option<String>,
    /// Stream disposition.
    pub disposition: Disposition,
}

/// Where an output subtitle stream comes from.
#[derive(Debug, Clone)]
pub enum SubtitleSource {
    /// A stream of the main input, by container index.
    Internal(u32),
    /// A sidecar file added as a secondary input, optionally read with a
    /// specific character encoding.
    External {
        path: PathBuf,
        encoding: Option<String>,
    },
}

/// Options for one output subtitle stream.
#[derive(Debug, Clone)]
pub struct SubtitleOptions {
    /// Source of the subtitle data.
    pub source: SubtitleSource,
    /// Output codec (e.g. `mov_text`), or `"copy"`.
    pub codec: String,
    /// Language tag written to stream metadata.
    pub language: Option<String>,
    /// Forced disposition flag.
    pub forced: bool,
    /// Default disposition flag.
    pub default: bool,
}

/// Complete encoder invocation spec for one conversion.
///
/// Output-stream ordering is significant: video, then audio in selection
/// order, then subtitles in selection order. The encoder addresses
/// streams positionally.
#[derive(Debug, Clone, Default)]
pub struct EncodeSpec {
    /// Output container format (`-f`).
    pub format: Option<String>,
    /// Options emitted before the input (`-fix_sub_duration`, hardware
    /// decoders, `-vsync`, ...).
    pub pre_options: Vec<String>,
    /// The output video stream, if any.
    pub video: Option<VideoOptions>,
    /// Output audio streams in order.
    pub audio: Vec<AudioOptions>,
    /// Output subtitle streams in order.
    pub subtitle: Vec<SubtitleOptions>,
    /// Options emitted after all stream options (`-threads`,
    /// `-movflags`, ...).
    pub post_options: Vec<String>,
}

impl EncodeSpec {
    /// Whether this spec passes the video stream through unchanged.
    pub fn copies_video(&self) -> bool {
        self.video.as_ref().is_some_and(VideoOptions::is_copy)
    }

    /// Sidecar files referenced as secondary inputs, in stream order.
    fn external_inputs(&self) -> Vec<(&Path, Option<&str>)> {
        self.subtitle
            .iter()
            .filter_map(|s| match &s.source {
                SubtitleSource::External { path, encoding } => {
                    Some((path.as_path(), encoding.as_deref()))
                }
                SubtitleSource::Internal(_) => None,
            })
            .collect()
    }

    /// Serialize the spec into a full encoder argv for `input` -> `output`.
    ///
    /// Secondary inputs are hoisted to the front, right after the main
    /// input. `-y` precedes the output path so an existing destination is
    /// overwritten.
    pub fn to_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        args.extend(self.pre_options.iter().cloned());
        args.push("-i".into());
        args.push(input.to_string_lossy().into_owned());
        for (path, encoding) in self.external_inputs() {
            if let Some(encoding) = encoding {
                args.push("-sub_charenc".into());
                args.push(encoding.into());
            }
            args.push("-i".into());
            args.push(path.to_string_lossy().into_owned());
        }

        if let Some(video) = &self.video {
            if let Some(map) = video.map {
                args.push("-map".into());
                args.push(format!("0:{map}"));
            }
            args.push("-c:v".into());
            args.push(video.codec.clone());
            if let Some(fc) = &video.filter_complex {
                args.push("-filter_complex".into());
                args.push(fc.clone());
            } else if let Some(vf) = &video.filter {
                args.push("-vf".into());
                args.push(vf.clone());
            }
            if !video.is_copy() {
                if let Some(crf) = video.crf {
                    args.push("-crf".into());
                    args.push(crf.to_string());
                } else if let Some(bitrate) = video.bitrate {
                    args.push("-b:v".into());
                    args.push(format!("{bitrate}k"));
                }
                if let Some(rate) = video.max_rate {
                    args.push("-maxrate".into());
                    args.push(format!("{rate}k"));
                }
                if let Some(rate) = video.min_rate {
                    args.push("-minrate".into());
                    args.push(format!("{rate}k"));
                }
                if let Some(size) = video.buf_size {
                    args.push("-bufsize".into());
                    args.push(format!("{size}k"));
                }
                if let Some(profile) = &video.profile {
                    args.push("-profile:v".into());
                    args.push(profile.clone());
                }
                if let Some(pix_fmt) = &video.pix_fmt {
                    args.push("-pix_fmt".into());
                    args.push(pix_fmt.clone());
                }
                if let Some(level) = video.level {
                    args.push("-level".into());
                    args.push(format!("{level}"));
                }
            }
        }

        let mut external_ordinal = 0u32;
        for (n, audio) in self.audio.iter().enumerate() {
            args.push("-map".into());
            args.push(format!("0:{}", audio.map));
            args.push(format!("-c:a:{n}"));
            args.push(audio.codec.clone());
            if audio.codec != "copy" {
                if let Some(channels) = audio.channels {
                    args.push(format!("-ac:a:{n}"));
                    args.push(channels.to_string());
                }
                if let Some(bitrate) = audio.bitrate {
                    args.push(format!("-b:a:{n}"));
                    args.push(format!("{bitrate}k"));
                }
                if let Some(rate) = audio.sample_rate {
                    args.push(format!("-ar:a:{n}"));
                    args.push(rate.to_string());
                }
                if let Some(filter) = &audio.filter {
                    args.push(format!("-filter:a:{n}"));
                    args.push(filter.clone());
                }
            }
            if let Some(bsf) = &audio.bsf {
                args.push(format!("-bsf:a:{n}"));
                args.push(bsf.clone());
            }
            if let Some(strict) = &audio.strict {
                args.push("-strict".into());
                args.push(strict.clone());
            }
            if let Some(language) = &audio.language {
                args.push(format!("-metadata:s:a:{n}"));
                args.push(format!("language={language}"));
            }
            args.push(format!("-disposition:a:{n}"));
            args.push(audio.disposition.as_str().into());
        }

        for (n, subtitle) in self.subtitle.iter().enumerate() {
            match &subtitle.source {
                SubtitleSource::Internal(index) => {
                    args.push("-map".into());
                    args.push(format!("0:{index}"));
                }
                SubtitleSource::External { .. } => {
                    external_ordinal += 1;
                    args.push("-map".into());
                    args.push(format!("{external_ordinal}:0"));
                }
            }
            args.push(format!("-c:s:{n}"));
            args.push(subtitle.codec.clone());
            if let Some(language) = &subtitle.language {
                args.push(format!("-metadata:s:s:{n}"));
                args.push(format!("language={language}"));
            }
            let disposition = match (subtitle.default, subtitle.forced) {
                (true, true) => "default+forced",
                (true, false) => "default",
                (false, true) => "forced",
                (false, false) => "0",
            };
            args.push(format!("-disposition:s:{n}"));
            args.push(disposition.into());
        }

        args.extend(self.post_options.iter().cloned());

        if let Some(format) = &self.format {
            args.push("-f".into());
            args.push(format.clone());
        }
        args.push("-y".into());
        args.push(output.to_string_lossy().into_owned());

        args
    }

    /// The full command line as a display string, for diagnostics.
    pub fn command_line(&self, program: &Path, input: &Path, output: &Path) -> String {
        let mut parts = vec![program.to_string_lossy().into_owned()];
        parts.extend(self.to_args(input, output));
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> EncodeSpec {
        EncodeSpec {
            format: Some("mp4".into()),
            pre_options: vec!["-fix_sub_duration".into()],
            video: Some(VideoOptions {
                map: Some(0),
                codec: "h264".into(),
                bitrate: Some(5000),
                ..Default::default()
            }),
            audio: vec![AudioOptions {
                map: 1,
                codec: "aac".into(),
                channels: Some(2),
                bitrate: Some(256),
                language: Some("eng".into()),
                disposition: Disposition::Default,
                ..Default::default()
            }],
            subtitle: vec![SubtitleOptions {
                source: SubtitleSource::Internal(2),
                codec: "mov_text".into(),
                language: Some("eng".into()),
                forced: true,
                default: false,
            }],
            post_options: vec!["-movflags".into(), "faststart".into()],
        }
    }

    #[test]
    fn args_preserve_stream_order() {
        let args = spec().to_args(Path::new("in.mkv"), Path::new("out.mp4"));
        let joined = args.join(" ");

        let video = joined.find("-c:v h264").unwrap();
        let audio = joined.find("-c:a:0 aac").unwrap();
        let subtitle = joined.find("-c:s:0 mov_text").unwrap();
        assert!(video < audio && audio < subtitle);

        // -y immediately precedes the output path.
        assert_eq!(args[args.len() - 2], "-y");
        assert_eq!(args[args.len() - 1], "out.mp4");
        assert_eq!(args[0], "-fix_sub_duration");
        assert_eq!(args[1], "-i");
    }

    #[test]
    fn copy_video_emits_no_rate_options() {
        let mut s = spec();
        s.video.as_mut().unwrap().codec = "copy".into();
        let joined = s.to_args(Path::new("a"), Path::new("b")).join(" ");
        assert!(joined.contains("-c:v copy"));
        assert!(!joined.contains("-b:v"));
        assert!(s.copies_video());
    }

    #[test]
    fn crf_replaces_bitrate() {
        let mut s = spec();
        s.video.as_mut().unwrap().crf = Some(19);
        let joined = s.to_args(Path::new("a"), Path::new("b")).join(" ");
        assert!(joined.contains("-crf 19"));
        assert!(!joined.contains("-b:v"));
    }

    #[test]
    fn external_subtitle_inputs_are_hoisted() {
        let mut s = spec();
        s.subtitle.push(SubtitleOptions {
            source: SubtitleSource::External {
                path: PathBuf::from("/subs/movie.eng.srt"),
                encoding: Some("utf-8".into()),
            },
            codec: "mov_text".into(),
            language: Some("eng".into()),
            forced: false,
            default: false,
        });
        let args = s.to_args(Path::new("in.mkv"), Path::new("out.mp4"));
        let joined = args.join(" ");

        // The sidecar is a secondary input right after the main one, and
        // its stream maps from input ordinal 1.
        let main_input = joined.find("-i in.mkv").unwrap();
        let sidecar = joined.find("-i /subs/movie.eng.srt").unwrap();
        let first_map = joined.find("-map").unwrap();
        assert!(main_input < sidecar && sidecar < first_map);
        assert!(joined.contains("-map 1:0"));
    }

    #[test]
    fn subtitle_disposition_combinations() {
        let mut s = spec();
        s.subtitle[0].default = true;
        let joined = s.to_args(Path::new("a"), Path::new("b")).join(" ");
        assert!(joined.contains("-disposition:s:0 default+forced"));
    }
}
