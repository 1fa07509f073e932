//! Subtitle stream decision logic, including forced-subtitle resolution.

use super::decision::{ExternalSubtitle, SubtitleDecision, SubtitleExtract};
use super::{lang, language_allowed, normalize_language, IMAGE_SUBTITLE_CODECS};
use crate::config::{Policy, SubtitlePolicy};
use crate::layout::FileLayout;
use crate::selection::audio::WhitelistRelaxation;
use crate::selection::decision::VideoDecision;
use mp4forge_probe::{ForcedSignal, MediaInfo, SubtitleStream};

/// The statistical forced guess is only adopted when the shortest
/// fingerprint is below this fraction of the longest; anything higher
/// probably means a second full subtitle track (or a commentary), not a
/// forced track. Empirically tuned; do not re-derive.
const FORCED_DURATION_RATIO: f64 = 0.75;

/// Initial "shortest" sentinel for the duration scan: one full day, which
/// no feature reaches.
const DURATION_SCAN_CEILING: u64 = 86_400;

/// Sidecar extensions recognized during the external subtitle scan.
const SIDECAR_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "vtt", "sub"];

/// Result of the subtitle pass.
pub(crate) struct SubtitleSelection {
    pub decisions: Vec<SubtitleDecision>,
    pub externals: Vec<ExternalSubtitle>,
    pub extracts: Vec<SubtitleExtract>,
    /// A forced subtitle is being burned into the video.
    pub burned: bool,
}

/// A forced-subtitle pick: the container stream index plus the ordinal
/// among subtitle streams only (filter graphs address subtitles by
/// ordinal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ForcedPick {
    pub index: u32,
    pub ordinal: usize,
}

struct Candidate {
    index: u32,
    ordinal: usize,
    forced: ForcedSignal,
    default: bool,
    duration_secs: Option<u64>,
}

/// Resolve which subtitle stream, if any, is the forced one.
///
/// Candidates are the whitelisted subtitle streams in source order, and
/// the first match in strict priority wins: forced-and-default
/// disposition, then forced disposition, then the title heuristic, then
/// (when no audio in the desired language exists at all) the first
/// candidate unconditionally. Failing all of that, a statistical guess
/// picks the stream with the shortest duration fingerprint, guarded by
/// the duration ratio sanity check.
pub(crate) fn resolve_forced(
    info: &MediaInfo,
    policy: &SubtitlePolicy,
    relaxation: &WhitelistRelaxation,
) -> Option<ForcedPick> {
    let mut candidates = Vec::new();
    for (ordinal, s) in info.subtitles().enumerate() {
        let language = normalize_language(s.language.as_deref(), policy.default_language.as_deref());
        if !language_allowed(&policy.languages, &language) {
            continue;
        }
        candidates.push(Candidate {
            index: s.index,
            ordinal,
            forced: s.forced,
            default: s.default,
            duration_secs: s.duration_hint_secs(),
        });
    }
    if candidates.is_empty() {
        return None;
    }

    let pick = |c: &Candidate| ForcedPick {
        index: c.index,
        ordinal: c.ordinal,
    };

    if let Some(c) = candidates
        .iter()
        .find(|c| c.forced == ForcedSignal::Disposition && c.default)
    {
        return Some(pick(c));
    }
    if let Some(c) = candidates
        .iter()
        .find(|c| c.forced == ForcedSignal::Disposition)
    {
        return Some(pick(c));
    }
    if let Some(c) = candidates.iter().find(|c| c.forced == ForcedSignal::Title) {
        return Some(pick(c));
    }
    if relaxation.relaxed {
        // No audio in the desired language: the first whitelisted
        // subtitle is the one that must always display.
        return Some(pick(&candidates[0]));
    }

    let mut shortest = DURATION_SCAN_CEILING;
    let mut longest = 1u64;
    let mut guess = None;
    for c in &candidates {
        if let Some(secs) = c.duration_secs {
            if secs < shortest {
                shortest = secs;
                guess = Some(pick(c));
            }
            if secs > longest {
                longest = secs;
            }
        }
    }
    if candidates.len() > 1
        && longest > 1
        && (shortest as f64 / longest as f64) < FORCED_DURATION_RATIO
    {
        tracing::info!("used duration-fingerprint forced subtitle guess");
        return guess;
    }

    None
}

/// Decide the output subtitle streams and, when requested, wire the
/// forced one into the video as a burn-in.
pub(crate) fn select_subtitles(
    info: &MediaInfo,
    policy: &Policy,
    relaxation: &WhitelistRelaxation,
    layout: &FileLayout,
    video: &mut VideoDecision,
) -> SubtitleSelection {
    let sp = &policy.subtitle;
    let forced = resolve_forced(info, sp, relaxation);
    let mut selection = SubtitleSelection {
        decisions: Vec::new(),
        externals: Vec::new(),
        extracts: Vec::new(),
        burned: false,
    };

    for s in info.subtitles() {
        let language = normalize_language(s.language.as_deref(), sp.default_language.as_deref());
        tracing::info!(stream = s.index, codec = %s.codec, language = %language, "subtitle detected");

        let is_image = IMAGE_SUBTITLE_CODECS.contains(&s.codec.to_lowercase().as_str());

        if sp.burn_in_forced {
            if let Some(forced) = forced {
                if s.index != forced.index {
                    continue;
                }
                burn_stream(s, forced, layout, video, &policy.video.codecs[0]);
                selection.burned = true;
                if !is_image && sp.embed && language_allowed(&sp.languages, &language) {
                    selection.decisions.push(SubtitleDecision {
                        map: s.index,
                        codec: sp.codecs[0].clone(),
                        language,
                        forced: true,
                        default: s.default,
                    });
                }
                continue;
            }
        }

        if is_image {
            // Image-based codecs cannot become text tracks; without a
            // burn they are left untouched.
            continue;
        }
        if !language_allowed(&sp.languages, &language) {
            continue;
        }

        // The resolved pick counts as forced even when only the
        // duration guess or the no-desired-audio rule identified it.
        let is_forced =
            s.forced.is_forced() || forced.is_some_and(|f| f.index == s.index);

        if sp.embed {
            tracing::info!(stream = s.index, "embedding subtitle stream");
            selection.decisions.push(SubtitleDecision {
                map: s.index,
                codec: sp.codecs[0].clone(),
                language,
                forced: is_forced,
                default: s.default,
            });
        } else {
            for codec in &sp.codecs {
                selection.extracts.push(SubtitleExtract {
                    map: s.index,
                    codec: codec.clone(),
                    language: language.clone(),
                    forced: is_forced,
                    extension: extension_for_codec(codec).to_string(),
                });
            }
        }
    }

    if sp.embed && !sp.embed_only_internal {
        scan_sidecars(
            layout,
            sp,
            &mut selection,
            forced.is_none(),
            video,
            &policy.video.codecs[0],
        );
    }

    selection
}

/// Wire one container stream into the video as a burn-in. Text codecs go
/// through the subtitles filter; image codecs are composited as an
/// overlay, with a scale-to-reference step when the video is also being
/// resized.
fn burn_stream(
    s: &SubtitleStream,
    pick: ForcedPick,
    layout: &FileLayout,
    video: &mut VideoDecision,
    reencode_target: &str,
) {
    if video.is_copy() {
        // Burning requires filter compositing, so the copy is off.
        video.codec = reencode_target.to_string();
    }

    if IMAGE_SUBTITLE_CODECS.contains(&s.codec.to_lowercase().as_str()) {
        if video.width.is_none() {
            video.overlay_filter = Some(format!("[0:v][0:{}]overlay", s.index));
        } else {
            // The resolution changes, so the picture subtitles must be
            // scaled to the new reference or they end up misplaced.
            video.overlay_filter = Some(format!(
                "[0:{}][video]scale2ref[sub][video];[video][sub]overlay",
                s.index
            ));
            video.drop_map = true;
        }
    } else {
        video.burn_filter = Some(format!(
            "subtitles={}:si={}",
            escape_filter_path(&layout.input.to_string_lossy()),
            pick.ordinal
        ));
    }
    tracing::info!(stream = s.index, "burning forced subtitle into the video");
}

/// Embed sidecar subtitle files named `<stem>.<lang>.<ext>` next to the
/// source.
fn scan_sidecars(
    layout: &FileLayout,
    policy: &SubtitlePolicy,
    selection: &mut SubtitleSelection,
    may_burn: bool,
    video: &mut VideoDecision,
    reencode_target: &str,
) {
    let entries = match std::fs::read_dir(&layout.directory) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %layout.directory.display(), %e, "sidecar scan skipped");
            return;
        }
    };

    let mut burned_external = false;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !SIDECAR_EXTENSIONS.contains(&extension.to_lowercase().as_str()) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        // `<video stem>.<lang>` is the only accepted shape.
        let Some((name, language_code)) = stem.rsplit_once('.') else {
            continue;
        };
        if name != layout.stem {
            continue;
        }

        let language = lang::to_alpha3(language_code);
        if !language_allowed(&policy.languages, &language) {
            tracing::info!(file = %path.display(), language = %language, "ignoring external subtitle");
            continue;
        }

        tracing::info!(file = %path.display(), language = %language, "external subtitle detected");
        if policy.burn_in_forced && may_burn && !burned_external {
            // No forced stream inside the container; burn the sidecar.
            if video.is_copy() {
                video.codec = reencode_target.to_string();
            }
            video.burn_filter = Some(format!(
                "subtitles={}",
                escape_filter_path(&path.to_string_lossy())
            ));
            selection.burned = true;
            burned_external = true;
        }
        selection.externals.push(ExternalSubtitle { path, language });
    }
}

/// Escape a path for use inside an ffmpeg filter argument.
pub(crate) fn escape_filter_path(path: &str) -> String {
    path.replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Sidecar extension for a subtitle codec.
pub(crate) fn extension_for_codec(codec: &str) -> &'static str {
    match codec.to_lowercase().as_str() {
        "ass" => "ass",
        "ssa" => "ssa",
        "webvtt" => "vtt",
        // srt, subrip, mov_text and anything unknown all rip to srt.
        _ => "srt",
    }
}
