//! Encode process supervision.
//!
//! One [`Supervisor`] conversion owns exactly one external encoder process
//! for its lifetime. The supervisor spawns ffmpeg, incrementally parses
//! its stderr progress stream, detects stalls, enforces an optional read
//! timeout, and classifies the terminal outcome. It never re-derives
//! policy: the [`EncodeSpec`] is only serialized.

use crate::progress::{ProgressEvent, ProgressParser};
use crate::spec::EncodeSpec;
use crate::{EncodeError, Result};
use std::collections::VecDeque;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Wall-clock budget after which a non-advancing frame index is treated
/// as a hang caused by a corrupt source. Empirically tuned; ten minutes
/// on a single frame means the encoder is not coming back.
pub const STALL_BUDGET: Duration = Duration::from_secs(600);

/// How often the poll loop wakes to check output and cancellation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a politely terminated encoder gets before being killed.
const TERM_GRACE: Duration = Duration::from_secs(2);

/// Bounded retries when removing a partially written destination that may
/// still be locked by a dying encoder.
const CLEANUP_RETRIES: u32 = 2;
const CLEANUP_DELAY: Duration = Duration::from_secs(10);

/// Warning ffmpeg emits when an input stream ends slightly before the
/// others; harmless trailing desync during the credits.
const BACKWARD_IN_TIME_MARKER: &str = "Queue input is backward in time";

/// Warning ffmpeg spams when copied video and re-encoded audio have
/// drifted apart mid-stream. The only fix is a full video re-encode.
const DTS_DESYNC_MARKER: &str = "Non-monotonous DTS";

/// Successful terminal record of one conversion.
#[derive(Debug, Clone)]
pub struct EncodeResult {
    /// Process id of the encoder that produced the output.
    pub pid: u32,
    /// Full captured encoder output, for diagnostics.
    pub log: String,
}

/// How a conversion ended when it did not fail.
#[derive(Debug)]
pub enum EncodeOutcome {
    /// The encoder finished and the destination file is complete.
    Completed(EncodeResult),
    /// The cancellation signal was observed; no terminal result exists.
    Cancelled,
}

/// Supervisor tuning knobs.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Path to the ffmpeg executable.
    pub ffmpeg: PathBuf,
    /// Cancellation/output poll cadence.
    pub poll_interval: Duration,
    /// Frame-stall budget.
    pub stall_budget: Duration,
    /// Optional hard budget per read cycle; `None` disables the check.
    pub read_timeout: Option<Duration>,
}

impl SupervisorConfig {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            poll_interval: POLL_INTERVAL,
            stall_budget: STALL_BUDGET,
            read_timeout: None,
        }
    }
}

/// Spawns and supervises encoder processes.
///
/// A supervisor may be reused across conversions, but each [`Conversion`]
/// owns its process exclusively; supervisors must not be shared between
/// concurrent conversions of the same destination path.
pub struct Supervisor {
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            config: SupervisorConfig::new(ffmpeg),
        }
    }

    pub fn with_config(config: SupervisorConfig) -> Self {
        Self { config }
    }

    /// Spawn the encoder for `spec` and return the running conversion.
    ///
    /// The returned [`Conversion`] is a pull-iterator of progress events;
    /// the consumer drives production and may stop early. Call
    /// [`Conversion::finish`] to reap the process and classify the
    /// terminal outcome.
    pub fn convert(
        &self,
        spec: &EncodeSpec,
        input: &Path,
        output: &Path,
        cancel: Arc<AtomicBool>,
    ) -> Result<Conversion> {
        if !input.exists() {
            return Err(EncodeError::InputNotFound {
                path: input.display().to_string(),
            });
        }

        let args = spec.to_args(input, output);
        let cmd = spec.command_line(&self.config.ffmpeg, input, output);
        tracing::debug!(cmd = %cmd, "spawning encoder");

        let mut child = Command::new(&self.config.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncodeError::Spawn {
                message: format!("{}: {e}", self.config.ffmpeg.display()),
            })?;

        let pid = child.id();
        let stderr = child.stderr.take().ok_or_else(|| EncodeError::Spawn {
            message: "encoder stderr was not captured".to_string(),
        })?;

        // A dedicated thread drains stderr in small chunks so the poll
        // loop below never blocks on a read. The channel disconnects at
        // EOF.
        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        let reader = std::thread::spawn(move || {
            let mut stderr = stderr;
            let mut buf = [0u8; 256];
            loop {
                match stderr.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let now = Instant::now();
        Ok(Conversion {
            child: Some(child),
            reader: Some(reader),
            rx,
            pid,
            cmd,
            parser: ProgressParser::new(pid),
            line_buf: String::new(),
            captured: String::new(),
            pending: VecDeque::new(),
            cancel,
            poll_interval: self.config.poll_interval,
            stall_budget: self.config.stall_budget,
            read_timeout: self.config.read_timeout,
            output: output.to_path_buf(),
            input_name: input.display().to_string(),
            copy_video: spec.copies_video(),
            last_frame: 0,
            stalled_since: now,
            last_data: now,
            ignore_backward_dts: false,
            yielded: false,
            phase: Phase::Running,
            fatal: None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Drained,
    Cancelled,
    Fatal,
}

/// One running conversion: a lazy sequence of progress events with a
/// terminal classification.
///
/// Dropping a conversion early terminates and reaps the encoder; the
/// process handle is released on every exit path.
pub struct Conversion {
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    rx: Receiver<Vec<u8>>,
    pid: u32,
    cmd: String,
    parser: ProgressParser,
    line_buf: String,
    captured: String,
    pending: VecDeque<ProgressEvent>,
    cancel: Arc<AtomicBool>,
    poll_interval: Duration,
    stall_budget: Duration,
    read_timeout: Option<Duration>,
    output: PathBuf,
    input_name: String,
    copy_video: bool,
    last_frame: u64,
    stalled_since: Instant,
    last_data: Instant,
    ignore_backward_dts: bool,
    yielded: bool,
    phase: Phase,
    fatal: Option<EncodeError>,
}

impl Conversion {
    /// Process id of the supervised encoder.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Terminate politely, escalate to kill, and reap.
    fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            #[cfg(unix)]
            // SAFETY: plain signal send to a pid we own.
            unsafe {
                libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
            }
            #[cfg(not(unix))]
            let _ = child.kill();

            let deadline = Instant::now() + TERM_GRACE;
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) if Instant::now() < deadline => {
                        std::thread::sleep(Duration::from_millis(50));
                    }
                    _ => {
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                }
            }
        }
        // Detach the reader thread rather than joining: a lingering
        // grandchild can keep the stderr pipe open past the encoder's
        // death, and the thread exits on its own at EOF.
        self.reader.take();
    }

    /// Terminate, remove the partial destination, and record the failure.
    fn fail(&mut self, error: EncodeError) {
        tracing::warn!(pid = self.pid, %error, "conversion failed");
        self.terminate();
        remove_with_retry(&self.output, CLEANUP_RETRIES, CLEANUP_DELAY);
        self.fatal = Some(error);
        self.phase = Phase::Fatal;
    }

    /// Fold a chunk of stderr into the line buffer and surface any
    /// complete progress lines.
    fn ingest(&mut self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        self.captured.push_str(&text);
        self.line_buf.push_str(&text);
        self.last_data = Instant::now();

        if text.contains(BACKWARD_IN_TIME_MARKER) {
            // The audio stream usually just ends a few seconds before the
            // video; any DTS warnings after this are during the credits
            // and not worth a re-encode.
            self.ignore_backward_dts = true;
        }

        if self.copy_video
            && !self.ignore_backward_dts
            && text.contains(DTS_DESYNC_MARKER)
        {
            self.fail(EncodeError::RequiresFullReencode {
                cmd: self.cmd.clone(),
                output: self.captured.clone(),
                pid: self.pid,
            });
            return;
        }

        while let Some(pos) = self.line_buf.find('\r') {
            let line = self.line_buf[..pos].to_string();
            self.line_buf.drain(..=pos);
            let event = self.parser.apply_line(&line);

            if event.frame != 0 && event.frame == self.last_frame {
                if self.stalled_since.elapsed() > self.stall_budget {
                    let budget_secs = self.stall_budget.as_secs();
                    self.fail(EncodeError::FrameStall {
                        budget_secs,
                        cmd: self.cmd.clone(),
                        output: self.captured.clone(),
                        pid: self.pid,
                    });
                    return;
                }
            } else {
                self.last_frame = event.frame;
                self.stalled_since = Instant::now();
            }

            self.yielded = true;
            self.pending.push_back(event);
        }
    }

    /// Reap the process and classify the terminal outcome.
    ///
    /// Remaining progress events are drained first so classification sees
    /// the complete captured output. Any failure removes a partially
    /// written destination before returning.
    pub fn finish(mut self) -> Result<EncodeOutcome> {
        while self.next().is_some() {}

        if self.phase == Phase::Cancelled {
            return Ok(EncodeOutcome::Cancelled);
        }
        if let Some(error) = self.fatal.take() {
            return Err(error);
        }

        let status = match self.child.take() {
            Some(mut child) => child.wait()?,
            None => {
                return Err(EncodeError::Unknown {
                    cmd: self.cmd.clone(),
                    output: self.captured.clone(),
                    pid: self.pid,
                })
            }
        };
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }

        if self.captured.is_empty() {
            self.cleanup();
            return Err(EncodeError::Unknown {
                cmd: self.cmd.clone(),
                output: String::new(),
                pid: self.pid,
            });
        }

        // Progress lines are '\r'-delimited while diagnostics end in
        // '\n'; split on both so the last real line is found either way.
        let last_line = self
            .captured
            .split(['\r', '\n'])
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .to_string();

        if last_line.starts_with("Received signal") {
            // e.g. "Received signal 15: terminating."
            let message = last_line
                .split(':')
                .next()
                .unwrap_or(&last_line)
                .to_string();
            self.cleanup();
            return Err(self.encoder_reported(message, None));
        }
        if let Some(detail) = last_line.strip_prefix(&format!("{}: ", self.input_name)) {
            let detail = detail.to_string();
            self.cleanup();
            return Err(self.encoder_reported("encoding error".to_string(), Some(detail)));
        }
        if last_line.starts_with("Error while ") || last_line.starts_with("Conversion failed!") {
            self.cleanup();
            return Err(self.encoder_reported("encoding error".to_string(), Some(last_line)));
        }
        if !self.yielded {
            self.cleanup();
            return Err(EncodeError::Unknown {
                cmd: self.cmd.clone(),
                output: self.captured.clone(),
                pid: self.pid,
            });
        }
        if !status.success() {
            self.cleanup();
            return Err(EncodeError::ExitStatus {
                code: status.code().unwrap_or(-1),
                cmd: self.cmd.clone(),
                output: self.captured.clone(),
                pid: self.pid,
            });
        }

        Ok(EncodeOutcome::Completed(EncodeResult {
            pid: self.pid,
            log: std::mem::take(&mut self.captured),
        }))
    }

    fn encoder_reported(&self, message: String, detail: Option<String>) -> EncodeError {
        EncodeError::EncoderReported {
            message,
            detail,
            cmd: self.cmd.clone(),
            output: self.captured.clone(),
            pid: self.pid,
        }
    }

    fn cleanup(&mut self) {
        remove_with_retry(&self.output, CLEANUP_RETRIES, CLEANUP_DELAY);
    }
}

impl Iterator for Conversion {
    type Item = ProgressEvent;

    /// One bounded, non-blocking poll tick per call. Returns promptly
    /// (within the poll interval) once the cancellation signal is set,
    /// even while the encoder is still running.
    fn next(&mut self) -> Option<ProgressEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            match self.phase {
                Phase::Running => {}
                Phase::Drained => {
                    // Very fast jobs may never emit a '\r'; surface one
                    // snapshot at EOF so consumers observe the job at all.
                    if !self.yielded {
                        self.yielded = true;
                        return Some(self.parser.snapshot());
                    }
                    return None;
                }
                Phase::Cancelled | Phase::Fatal => return None,
            }

            if self.cancel.load(Ordering::Relaxed) {
                tracing::debug!(pid = self.pid, "cancellation signal observed");
                self.terminate();
                self.phase = Phase::Cancelled;
                return None;
            }

            match self.rx.recv_timeout(self.poll_interval) {
                Ok(chunk) => self.ingest(&chunk),
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(budget) = self.read_timeout {
                        if self.last_data.elapsed() >= budget {
                            self.fail(EncodeError::Timeout {
                                cmd: self.cmd.clone(),
                                output: self.captured.clone(),
                                pid: self.pid,
                            });
                            return None;
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.phase = Phase::Drained;
                }
            }
        }
    }
}

impl Drop for Conversion {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Remove a file, retrying with a delay when it is still held open.
///
/// Returns true when the file is gone afterwards.
pub fn remove_with_retry(path: &Path, retries: u32, delay: Duration) -> bool {
    for attempt in 0..=retries {
        if !path.exists() {
            return true;
        }
        match std::fs::remove_file(path) {
            Ok(()) => return true,
            Err(e) => {
                tracing::debug!(path = %path.display(), attempt, %e, "unable to remove file");
                if attempt < retries && !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
        }
    }
    !path.exists()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::spec::VideoOptions;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable fake encoder script and a dummy input file.
    fn fixture(script_body: &str) -> (tempfile::TempDir, Supervisor, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ffmpeg");
        std::fs::write(&script, format!("#!/bin/sh\n{script_body}\n")).unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let input = dir.path().join("input.mkv");
        std::fs::write(&input, b"not really a video").unwrap();
        let output = dir.path().join("output.mp4");

        (dir, Supervisor::new(&script), input, output)
    }

    fn fast_config(supervisor: &mut Supervisor) {
        // Tighten budgets so tests run in milliseconds, not minutes.
        supervisor.config.poll_interval = Duration::from_millis(20);
        supervisor.config.stall_budget = Duration::from_millis(300);
    }

    fn copy_spec() -> EncodeSpec {
        EncodeSpec {
            video: Some(VideoOptions {
                map: Some(0),
                codec: "copy".into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn progress_line(frame: u64, secs: u64) -> String {
        format!(
            "printf 'frame={frame:>5} fps= 25 q=28.0 time=00:00:{secs:02}.00 bitrate=1000.0kbits/s speed=1.0x \\r' >&2"
        )
    }

    #[test]
    fn progress_events_are_streamed() {
        let (_dir, supervisor, input, output) = fixture(&format!(
            "{}\n{}\nexit 0",
            progress_line(10, 1),
            progress_line(20, 2)
        ));
        let cancel = Arc::new(AtomicBool::new(false));
        let conversion = supervisor
            .convert(&copy_spec(), &input, &output, cancel)
            .unwrap();

        let mut frames = Vec::new();
        let mut conversion = conversion;
        for event in conversion.by_ref() {
            frames.push(event.frame);
        }
        assert_eq!(frames, vec![10, 20]);

        match conversion.finish().unwrap() {
            EncodeOutcome::Completed(result) => assert!(result.log.contains("frame=")),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn stall_is_detected_and_destination_removed() {
        let mut lines = vec!["i=0".to_string(), "while [ $i -lt 40 ]; do".to_string()];
        lines.push(format!("  {}", progress_line(42, 1)));
        lines.push("  sleep 0.05".to_string());
        lines.push("  i=$((i+1))".to_string());
        lines.push("done".to_string());
        let (_dir, mut supervisor, input, output) = fixture(&lines.join("\n"));
        fast_config(&mut supervisor);

        std::fs::write(&output, b"partial").unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let conversion = supervisor
            .convert(&copy_spec(), &input, &output, cancel)
            .unwrap();

        let result = conversion.finish();
        assert!(matches!(result, Err(EncodeError::FrameStall { .. })));
        assert!(!output.exists(), "partial destination must be removed");
    }

    #[test]
    fn cancellation_returns_within_poll_interval_without_result() {
        let (_dir, mut supervisor, input, output) = fixture("sleep 5");
        fast_config(&mut supervisor);

        let cancel = Arc::new(AtomicBool::new(false));
        let mut conversion = supervisor
            .convert(&copy_spec(), &input, &output, Arc::clone(&cancel))
            .unwrap();

        cancel.store(true, Ordering::Relaxed);
        let started = Instant::now();
        assert!(conversion.next().is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(matches!(
            conversion.finish().unwrap(),
            EncodeOutcome::Cancelled
        ));
    }

    #[test]
    fn mid_stream_dts_desync_requires_full_reencode() {
        let (_dir, supervisor, input, output) = fixture(&format!(
            "{}\nprintf 'Non-monotonous DTS in output stream 0:1\\n' >&2\nsleep 2",
            progress_line(10, 1)
        ));
        let cancel = Arc::new(AtomicBool::new(false));
        let conversion = supervisor
            .convert(&copy_spec(), &input, &output, cancel)
            .unwrap();

        let result = conversion.finish();
        assert!(matches!(
            result,
            Err(EncodeError::RequiresFullReencode { .. })
        ));
    }

    #[test]
    fn trailing_dts_desync_is_tolerated() {
        let (_dir, supervisor, input, output) = fixture(&format!(
            "{}\nprintf 'Queue input is backward in time\\n' >&2\nprintf 'Non-monotonous DTS in output stream 0:1\\n' >&2\nexit 0",
            progress_line(10, 1)
        ));
        let cancel = Arc::new(AtomicBool::new(false));
        let conversion = supervisor
            .convert(&copy_spec(), &input, &output, cancel)
            .unwrap();

        assert!(matches!(
            conversion.finish().unwrap(),
            EncodeOutcome::Completed(_)
        ));
    }

    #[test]
    fn reencode_job_ignores_dts_desync() {
        let (_dir, supervisor, input, output) = fixture(&format!(
            "{}\nprintf 'Non-monotonous DTS in output stream 0:1\\n' >&2\nexit 0",
            progress_line(10, 1)
        ));
        let mut spec = copy_spec();
        spec.video.as_mut().unwrap().codec = "h264".into();
        let cancel = Arc::new(AtomicBool::new(false));
        let conversion = supervisor.convert(&spec, &input, &output, cancel).unwrap();

        assert!(matches!(
            conversion.finish().unwrap(),
            EncodeOutcome::Completed(_)
        ));
    }

    #[test]
    fn unresponsive_encoder_times_out() {
        let (_dir, mut supervisor, input, output) = fixture("sleep 5");
        fast_config(&mut supervisor);
        supervisor.config.read_timeout = Some(Duration::from_millis(200));

        let cancel = Arc::new(AtomicBool::new(false));
        let conversion = supervisor
            .convert(&copy_spec(), &input, &output, cancel)
            .unwrap();

        let started = Instant::now();
        let result = conversion.finish();
        assert!(matches!(result, Err(EncodeError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn silent_job_is_an_unknown_failure() {
        let (_dir, supervisor, input, output) = fixture("exit 0");
        let cancel = Arc::new(AtomicBool::new(false));
        let conversion = supervisor
            .convert(&copy_spec(), &input, &output, cancel)
            .unwrap();

        let result = conversion.finish();
        assert!(matches!(result, Err(EncodeError::Unknown { .. })));
    }

    #[test]
    fn conversion_failed_marker_is_classified() {
        let (_dir, supervisor, input, output) = fixture(&format!(
            "{}\nprintf 'Conversion failed!\\n' >&2\nexit 1",
            progress_line(10, 1)
        ));
        let cancel = Arc::new(AtomicBool::new(false));
        let conversion = supervisor
            .convert(&copy_spec(), &input, &output, cancel)
            .unwrap();

        match conversion.finish() {
            Err(EncodeError::EncoderReported { detail, .. }) => {
                assert_eq!(detail.as_deref(), Some("Conversion failed!"));
            }
            other => panic!("expected encoder-reported error, got {other:?}"),
        }
    }

    #[test]
    fn nonzero_exit_without_marker_is_exit_status() {
        let (_dir, supervisor, input, output) = fixture(&format!(
            "{}\nexit 3",
            progress_line(10, 1)
        ));
        let cancel = Arc::new(AtomicBool::new(false));
        let conversion = supervisor
            .convert(&copy_spec(), &input, &output, cancel)
            .unwrap();

        assert!(matches!(
            conversion.finish(),
            Err(EncodeError::ExitStatus { code: 3, .. })
        ));
    }

    #[test]
    fn missing_input_fails_before_spawn() {
        let (_dir, supervisor, _input, output) = fixture("exit 0");
        let cancel = Arc::new(AtomicBool::new(false));
        let result = supervisor.convert(
            &copy_spec(),
            Path::new("/nonexistent/input.mkv"),
            &output,
            cancel,
        );
        assert!(matches!(result, Err(EncodeError::InputNotFound { .. })));
    }
}
