//! Per-file conversion orchestration.

use super::{VALID_INPUT_EXTENSIONS, VALID_OUTPUT_EXTENSIONS};
use crate::config::Config;
use crate::layout::FileLayout;
use crate::selection::{StreamDecisions, SubtitleExtract};
use crate::{options, selection};
use anyhow::{Context, Result};
use mp4forge_encode::{
    remove_with_retry, EncodeError, EncodeOutcome, ProgressEvent, Supervisor, SupervisorConfig,
    POLL_INTERVAL, STALL_BUDGET,
};
use mp4forge_probe::MediaInfo;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Bounded retries when deleting a source file that may still be locked.
const REMOVE_RETRIES: u32 = 2;
const REMOVE_DELAY: Duration = Duration::from_secs(10);

/// Final report for one processed file, consumed by tagging/relocation
/// collaborators.
#[derive(Debug)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Decision set of the successful attempt; `None` when the file was
    /// moved without conversion.
    pub decisions: Option<StreamDecisions>,
    pub input_deleted: bool,
    pub width: u32,
    pub height: u32,
}

/// How processing one file ended.
#[derive(Debug)]
pub enum ProcessOutcome {
    Converted(ConversionReport),
    Skipped { reason: String },
    Cancelled,
}

/// Orchestrates one conversion at a time: probe, select, synthesize,
/// supervise, clean up.
pub struct ConversionManager {
    config: Arc<Config>,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl ConversionManager {
    /// Create a manager, resolving the external tools up front.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let ffmpeg = mp4forge_encode::get_tool_path("ffmpeg", config.tools.ffmpeg.as_deref())
            .context("ffmpeg is required")?;
        let ffprobe = mp4forge_encode::get_tool_path("ffprobe", config.tools.ffprobe.as_deref())
            .context("ffprobe is required")?;
        Ok(Self {
            config,
            ffmpeg,
            ffprobe,
        })
    }

    /// Whether the file is a usable conversion source.
    pub fn valid_source(&self, layout: &FileLayout) -> bool {
        if layout.extension == "m2ts" && !self.config.output.handle_m2ts {
            tracing::debug!(input = %layout.input.display(), "m2ts handling is disabled");
            return false;
        }
        let known = VALID_INPUT_EXTENSIONS.contains(&layout.extension.as_str())
            || VALID_OUTPUT_EXTENSIONS.contains(&layout.extension.as_str());
        known && layout.input.is_file()
    }

    /// Whether the file needs a conversion pass at all.
    pub fn needs_processing(&self, layout: &FileLayout) -> bool {
        let convertible = VALID_INPUT_EXTENSIONS.contains(&layout.extension.as_str())
            || (self.config.output.process_same_container
                && VALID_OUTPUT_EXTENSIONS.contains(&layout.extension.as_str()));
        convertible
            && VALID_OUTPUT_EXTENSIONS
                .contains(&self.config.output.extension.to_lowercase().as_str())
    }

    /// Process one file end to end.
    ///
    /// Emits progress through `on_progress` while the encoder runs. On a
    /// mid-stream timestamp desync the whole job is retried exactly once
    /// with a forced full re-encode.
    pub fn process_file<F>(
        &self,
        input: &Path,
        cancel: Arc<AtomicBool>,
        mut on_progress: F,
    ) -> Result<ProcessOutcome>
    where
        F: FnMut(&ProgressEvent),
    {
        let layout = FileLayout::new(input)?;
        if !self.valid_source(&layout) {
            return Ok(ProcessOutcome::Skipped {
                reason: format!("not a valid source: {}", layout.input.display()),
            });
        }
        if !self.needs_processing(&layout) {
            return self.relocate_only(&layout);
        }

        let info = mp4forge_probe::probe_file(&self.ffprobe, &layout.input)
            .context("Failed to probe source")?;

        // Resolve the destination first; when source and destination
        // collide the source is renamed out of the way, and every later
        // step uses the renamed path.
        let (effective_input, output_path) = self.resolve_paths(&layout)?;
        let layout = FileLayout::new(&effective_input)?;

        let mut policy = self.config.policy();
        let mut retried = false;
        let decisions = loop {
            let decisions = selection::select(&info, &policy, &layout)?;
            if let Ok(rendered) = serde_json::to_string_pretty(&decisions) {
                tracing::debug!("decisions: {rendered}");
            }
            let spec = options::synthesize(&decisions, &policy);

            let supervisor = Supervisor::with_config(SupervisorConfig {
                ffmpeg: self.ffmpeg.clone(),
                poll_interval: POLL_INTERVAL,
                stall_budget: STALL_BUDGET,
                read_timeout: self
                    .config
                    .process
                    .read_timeout_secs
                    .map(Duration::from_secs),
            });

            tracing::info!(
                input = %layout.input.display(),
                output = %output_path.display(),
                "starting conversion"
            );
            let mut conversion =
                supervisor.convert(&spec, &layout.input, &output_path, Arc::clone(&cancel))?;
            for event in conversion.by_ref() {
                on_progress(&event);
            }

            match conversion.finish() {
                Ok(EncodeOutcome::Completed(result)) => {
                    tracing::info!(pid = result.pid, output = %output_path.display(), "conversion complete");
                    break decisions;
                }
                Ok(EncodeOutcome::Cancelled) => {
                    tracing::info!("conversion cancelled");
                    remove_with_retry(&output_path, 0, Duration::ZERO);
                    return Ok(ProcessOutcome::Cancelled);
                }
                Err(EncodeError::RequiresFullReencode { .. }) if !retried => {
                    tracing::warn!(
                        "audio/video timestamps desynced mid-stream; retrying once with a full re-encode"
                    );
                    retried = true;
                    policy.force_convert = true;
                    continue;
                }
                Err(e) => {
                    if let Some(cmd) = e.command_line() {
                        tracing::error!("failed command: {cmd}");
                    }
                    if let Some(output) = e.captured_output() {
                        tracing::error!("encoder output:\n{output}");
                    }
                    return Err(e).context("Conversion failed");
                }
            }
        };

        self.apply_permissions(&output_path);
        self.run_extractions(&decisions.extracts, &layout, &cancel);

        let mut input_deleted = false;
        if self.config.output.delete_source && layout.input != output_path {
            input_deleted = remove_with_retry(&layout.input, REMOVE_RETRIES, REMOVE_DELAY);
            if input_deleted {
                tracing::debug!(input = %layout.input.display(), "source deleted");
            } else {
                tracing::error!(input = %layout.input.display(), "couldn't delete source");
            }
        }

        let (width, height) = self.dimensions_of(&output_path, &info);
        Ok(ProcessOutcome::Converted(ConversionReport {
            input: layout.input,
            output: output_path,
            decisions: Some(decisions),
            input_deleted,
            width,
            height,
        }))
    }

    /// A file that is already compatible is copied to the output
    /// directory when one is configured; otherwise there is nothing to
    /// do.
    fn relocate_only(&self, layout: &FileLayout) -> Result<ProcessOutcome> {
        let Some(dir) = &self.config.output.dir else {
            return Ok(ProcessOutcome::Skipped {
                reason: format!("already compatible: {}", layout.input.display()),
            });
        };

        let file_name = format!("{}.{}", layout.stem, layout.extension);
        let destination = dir.join(file_name);
        std::fs::copy(&layout.input, &destination)
            .with_context(|| format!("Failed to copy to output directory: {:?}", destination))?;
        self.apply_permissions(&destination);

        let mut input_deleted = false;
        if self.config.output.delete_source {
            input_deleted = remove_with_retry(&layout.input, REMOVE_RETRIES, REMOVE_DELAY);
        }

        let (width, height) = match mp4forge_probe::probe_file(&self.ffprobe, &destination) {
            Ok(info) => info.video().map(|v| (v.width, v.height)).unwrap_or((0, 0)),
            Err(_) => (0, 0),
        };

        Ok(ProcessOutcome::Converted(ConversionReport {
            input: layout.input.clone(),
            output: destination,
            decisions: None,
            input_deleted,
            width,
            height,
        }))
    }

    /// Compute the destination path, renaming the source aside when the
    /// two collide (best effort; a numbered destination otherwise).
    fn resolve_paths(&self, layout: &FileLayout) -> Result<(PathBuf, PathBuf)> {
        let output = layout.output_path(
            self.config.output.dir.as_deref(),
            &self.config.output.extension,
        );
        if layout.input != output {
            return Ok((layout.input.clone(), output));
        }

        let renamed = PathBuf::from(format!("{}.original", layout.input.display()));
        match std::fs::rename(&layout.input, &renamed) {
            Ok(()) => {
                tracing::debug!(renamed = %renamed.display(), "renamed original out of the way");
                Ok((renamed, output))
            }
            Err(e) => {
                tracing::debug!(%e, "unable to rename source; numbering the destination instead");
                let dir = self.config.output.dir.as_deref().unwrap_or(&layout.directory);
                let mut i = 2;
                let mut numbered = output;
                while numbered.is_file() {
                    numbered = dir.join(format!(
                        "{}({}).{}",
                        layout.stem, i, self.config.output.extension
                    ));
                    i += 1;
                }
                Ok((layout.input.clone(), numbered))
            }
        }
    }

    /// Rip the queued subtitle extracts into sidecar files. Extraction
    /// failures are logged, never fatal for the main conversion.
    fn run_extractions(
        &self,
        extracts: &[SubtitleExtract],
        layout: &FileLayout,
        cancel: &Arc<AtomicBool>,
    ) {
        for extract in extracts {
            let forced = if extract.forced { ".forced" } else { "" };
            let middle = format!("{}{}", extract.language, forced);
            let dir = self.config.output.dir.as_deref();
            let mut destination = layout.sidecar_path(dir, &middle, &extract.extension);
            let mut i = 2;
            while destination.is_file() {
                destination =
                    layout.sidecar_path(dir, &format!("{middle}.{i}"), &extract.extension);
                i += 1;
            }

            tracing::info!(
                stream = extract.map,
                language = %extract.language,
                output = %destination.display(),
                "ripping subtitle stream to sidecar file"
            );

            let spec = options::synthesize_extract(extract);
            let supervisor = Supervisor::new(self.ffmpeg.clone());
            let result = supervisor
                .convert(&spec, &layout.input, &destination, Arc::clone(cancel))
                .and_then(|mut conversion| {
                    for _ in conversion.by_ref() {}
                    conversion.finish()
                });
            match result {
                Ok(EncodeOutcome::Completed(_)) => {
                    self.apply_permissions(&destination);
                }
                Ok(EncodeOutcome::Cancelled) => return,
                Err(e) => {
                    tracing::warn!(stream = extract.map, %e, "unable to rip subtitle stream");
                }
            }
        }
    }

    fn apply_permissions(&self, path: &Path) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(self.config.output.permissions);
            if let Err(e) = std::fs::set_permissions(path, permissions) {
                tracing::warn!(path = %path.display(), %e, "unable to set file permissions");
            }
        }
        #[cfg(not(unix))]
        let _ = path;
    }

    /// Dimensions for the report: probe the produced file, fall back to
    /// the source snapshot.
    fn dimensions_of(&self, output: &Path, source: &MediaInfo) -> (u32, u32) {
        if let Ok(info) = mp4forge_probe::probe_file(&self.ffprobe, output) {
            if let Some(v) = info.video() {
                return (v.width, v.height);
            }
        }
        source
            .video()
            .map(|v| (v.width, v.height))
            .unwrap_or((0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn manager_with(config: Config) -> ConversionManager {
        // Tool resolution is bypassed so these tests run without ffmpeg
        // installed.
        ConversionManager {
            config: Arc::new(config),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }

    #[test]
    fn m2ts_requires_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("movie.m2ts");
        std::fs::write(&file, b"x").unwrap();
        let layout = FileLayout::new(&file).unwrap();

        let manager = manager_with(Config::default());
        assert!(!manager.valid_source(&layout));

        let mut config = Config::default();
        config.output.handle_m2ts = true;
        let manager = manager_with(config);
        assert!(manager.valid_source(&layout));
    }

    #[test]
    fn unknown_extension_is_not_a_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, b"x").unwrap();
        let layout = FileLayout::new(&file).unwrap();
        assert!(!manager_with(Config::default()).valid_source(&layout));
    }

    #[test]
    fn same_container_needs_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("movie.mp4");
        std::fs::write(&file, b"x").unwrap();
        let layout = FileLayout::new(&file).unwrap();

        let manager = manager_with(Config::default());
        assert!(manager.valid_source(&layout));
        assert!(!manager.needs_processing(&layout));

        let mut config = Config::default();
        config.output.process_same_container = true;
        assert!(manager_with(config).needs_processing(&layout));
    }

    #[test]
    fn colliding_paths_rename_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("movie.mp4");
        std::fs::write(&file, b"x").unwrap();
        let layout = FileLayout::new(&file).unwrap();

        let manager = manager_with(Config::default());
        let (input, output) = manager.resolve_paths(&layout).unwrap();
        assert_ne!(input, output);
        assert!(input.to_string_lossy().ends_with(".original"));
        assert!(input.exists());
        assert_eq!(output, layout.input);
    }

    #[test]
    fn distinct_paths_stay_put() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("movie.mkv");
        std::fs::write(&file, b"x").unwrap();
        let layout = FileLayout::new(&file).unwrap();

        let manager = manager_with(Config::default());
        let (input, output) = manager.resolve_paths(&layout).unwrap();
        assert_eq!(input, layout.input);
        assert_eq!(output, dir.path().join("movie.mp4"));
    }
}
