//! Incremental parsing of encoder progress lines.
//!
//! ffmpeg reports progress as carriage-return-delimited status lines on
//! stderr (`frame= 1234 fps= 48 q=28.0 size=... time=00:01:23.45 ...`).
//! Fields update asynchronously, not atomically: a line may omit any of
//! them, in which case the last known value is retained.

use regex::Regex;

/// One progress sample from a running encode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressEvent {
    /// Position in the source, in seconds.
    pub timecode: f64,
    /// Last encoded frame index.
    pub frame: u64,
    /// Encoding rate in frames per second.
    pub fps: f64,
    /// Encoder quality metric (`q=`).
    pub quality: f64,
    /// Relative encoding speed as reported (e.g. `"1.05x"`).
    pub speed: String,
    /// Output bitrate as reported (e.g. `"1843.2kbits/s"`).
    pub bitrate: String,
    /// Process id of the encoder.
    pub pid: u32,
}

/// Parses progress lines, carrying the last known value of every field.
pub struct ProgressParser {
    re_time: Regex,
    re_frame: Regex,
    re_fps: Regex,
    re_quality: Regex,
    re_speed: Regex,
    re_bitrate: Regex,
    current: ProgressEvent,
}

impl ProgressParser {
    pub fn new(pid: u32) -> Self {
        Self {
            re_time: Regex::new(r"time=\s*([0-9.:]+)").unwrap(),
            re_frame: Regex::new(r"frame=\s*(\d+)").unwrap(),
            re_fps: Regex::new(r"fps=\s*([\d.]+)").unwrap(),
            re_quality: Regex::new(r"q=\s*(-?[\d.]+)").unwrap(),
            re_speed: Regex::new(r"speed=\s*([\d.]+x)").unwrap(),
            re_bitrate: Regex::new(r"bitrate=\s*([\d.]+\s*\w+/s)").unwrap(),
            current: ProgressEvent {
                pid,
                ..ProgressEvent::default()
            },
        }
    }

    /// Fold one status line into the running state and return a snapshot.
    ///
    /// Each field is matched independently; fields absent from the line
    /// keep their previous value.
    pub fn apply_line(&mut self, line: &str) -> ProgressEvent {
        if let Some(c) = self.re_time.captures(line) {
            self.current.timecode = parse_timecode(&c[1]);
        }
        if let Some(c) = self.re_frame.captures(line) {
            self.current.frame = c[1].parse().unwrap_or(self.current.frame);
        }
        if let Some(c) = self.re_fps.captures(line) {
            self.current.fps = c[1].parse().unwrap_or(self.current.fps);
        }
        if let Some(c) = self.re_quality.captures(line) {
            self.current.quality = c[1].parse().unwrap_or(self.current.quality);
        }
        if let Some(c) = self.re_speed.captures(line) {
            self.current.speed = c[1].trim().to_string();
        }
        if let Some(c) = self.re_bitrate.captures(line) {
            self.current.bitrate = c[1].trim().to_string();
        }
        self.current.clone()
    }

    /// Snapshot of the current state without applying a line.
    pub fn snapshot(&self) -> ProgressEvent {
        self.current.clone()
    }
}

/// Fold `HH:MM:SS.f` (or bare seconds) into seconds.
fn parse_timecode(text: &str) -> f64 {
    if text.contains(':') {
        text.split(':')
            .filter_map(|part| part.parse::<f64>().ok())
            .fold(0.0, |acc, part| 60.0 * acc + part)
    } else {
        text.parse().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str =
        "frame=  813 fps= 27 q=28.0 size=    4608kB time=00:00:34.13 bitrate=1105.9kbits/s speed=1.13x ";

    #[test]
    fn full_line_extracts_all_fields() {
        let mut parser = ProgressParser::new(4242);
        let event = parser.apply_line(LINE);
        assert_eq!(event.frame, 813);
        assert_eq!(event.fps, 27.0);
        assert_eq!(event.quality, 28.0);
        assert!((event.timecode - 34.13).abs() < 1e-9);
        assert_eq!(event.speed, "1.13x");
        assert_eq!(event.bitrate, "1105.9kbits/s");
        assert_eq!(event.pid, 4242);
    }

    #[test]
    fn missing_fields_retain_last_value() {
        let mut parser = ProgressParser::new(1);
        parser.apply_line(LINE);
        let event = parser.apply_line("frame=  900 time=00:00:37.90 ");
        assert_eq!(event.frame, 900);
        assert!((event.timecode - 37.9).abs() < 1e-9);
        // Unreported fields stay put.
        assert_eq!(event.fps, 27.0);
        assert_eq!(event.speed, "1.13x");
    }

    #[test]
    fn timecode_forms() {
        assert!((parse_timecode("01:02:03.5") - 3723.5).abs() < 1e-9);
        assert!((parse_timecode("12.25") - 12.25).abs() < 1e-9);
        assert_eq!(parse_timecode("garbage"), 0.0);
    }

    #[test]
    fn negative_quality_is_parsed() {
        let mut parser = ProgressParser::new(1);
        let event = parser.apply_line("frame=  10 q=-1.0 ");
        assert_eq!(event.quality, -1.0);
    }
}
