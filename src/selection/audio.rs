//! Audio stream decision logic.

use super::decision::AudioDecision;
use super::{language_allowed, normalize_language};
use crate::config::{AudioPolicy, Policy};
use mp4forge_probe::MediaInfo;

/// Fallback per-channel bitrate when the source stream bitrate is wanted
/// but unknown.
const FALLBACK_CHANNEL_KBPS: u32 = 256;

/// Ceiling for the derived stereo compatibility stream.
const COMPAT_BITRATE_CEILING: u32 = 384;
const COMPAT_BITRATE_FALLBACK: u32 = 256;

/// Per-channel cap applied when the compat codec becomes the primary.
const COMPAT_CHANNEL_KBPS: u32 = 128;

/// Outcome of the language whitelist pre-scan.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WhitelistRelaxation {
    /// No stream matched the whitelist or default language; the
    /// whitelist is dropped for this file so at least one audio stream
    /// survives.
    pub relaxed: bool,
    /// Streams that did match.
    pub desired_count: usize,
}

/// Scan the audio streams once to decide whether the language whitelist
/// must be relaxed for this file.
pub(crate) fn whitelist_relaxation(info: &MediaInfo, policy: &AudioPolicy) -> WhitelistRelaxation {
    if policy.languages.is_empty() && policy.default_language.is_none() {
        return WhitelistRelaxation {
            relaxed: false,
            desired_count: info.audio().count(),
        };
    }

    let mut desired_count = 0;
    for a in info.audio() {
        let language = normalize_language(a.language.as_deref(), None);
        let desired = (language == "und" && policy.default_language.is_some())
            || (!policy.languages.is_empty() && language_allowed(&policy.languages, &language));
        if desired {
            desired_count += 1;
        }
    }

    WhitelistRelaxation {
        relaxed: desired_count == 0,
        desired_count,
    }
}

/// Decide the output audio streams, in source order.
pub(crate) fn select_audio(
    info: &MediaInfo,
    policy: &Policy,
    relaxation: &WhitelistRelaxation,
) -> Vec<AudioDecision> {
    let ap = &policy.audio;
    let mut decisions: Vec<AudioDecision> = Vec::new();
    let mut copy_original = ap.copy_original;
    let mut compat_enabled = ap.compat.enabled();
    // The first stream's rate is adopted for every later one so derived
    // streams stay consistent.
    let mut sample_rate = ap.sample_rate;

    for a in info.audio() {
        let language = normalize_language(a.language.as_deref(), None);
        tracing::info!(
            stream = a.index,
            codec = %a.codec,
            language = %language,
            "audio detected"
        );

        if policy.is_mp4() && a.codec.eq_ignore_ascii_case("truehd") {
            if relaxation.desired_count < 2 || relaxation.relaxed {
                tracing::warn!(
                    stream = a.index,
                    "MP4 cannot carry TrueHD and this is the only track in the desired language; \
                     converting it, but audio sync issues are possible"
                );
                copy_original = false;
            } else {
                tracing::info!(
                    stream = a.index,
                    "skipping TrueHD stream; the AC3 core typically follows as the next track"
                );
                continue;
            }
        }
        if policy.is_mp4() && a.codec.to_lowercase().starts_with("pcm") {
            // PCM cannot be carried in MP4 either, so keeping an
            // original copy would just fail the mux.
            copy_original = false;
        }

        let language = if language == "und" {
            normalize_language(Some(&language), ap.default_language.as_deref())
        } else {
            language
        };

        if sample_rate.is_none() {
            sample_rate = Some(a.sample_rate.unwrap_or(48_000));
        }

        if !relaxation.relaxed && !language_allowed(&ap.languages, &language) {
            continue;
        }

        // Derived stereo stream for >2ch sources.
        let mut compat_pending = None;
        if compat_enabled && a.channels > 2 {
            let doubled = ap.bitrate_per_channel * 2;
            let compat_bitrate = if doubled > COMPAT_BITRATE_CEILING {
                COMPAT_BITRATE_FALLBACK
            } else {
                doubled
            };
            let compat = AudioDecision {
                map: a.index,
                codec: ap.compat.codecs[0].clone(),
                channels: Some(2),
                bitrate: Some(compat_bitrate),
                sample_rate,
                language: language.clone(),
                filter: ap.compat.filter.clone(),
                bsf: None,
                strict: None,
                default: decisions.is_empty(),
            };
            if ap.compat.insert_last {
                compat_pending = Some(compat);
            } else {
                tracing::info!(
                    stream = a.index,
                    "creating stereo compatibility stream before the primary"
                );
                decisions.push(compat);
            }
        }

        let (codec, channels, bitrate, filter) = if compat_enabled && a.channels <= 2 {
            // Stereo source: no extra stream, the primary itself uses the
            // compat codec so we do not end up with duplicate stereo
            // tracks.
            let codec = if ap.compat.codecs.iter().any(|c| c.eq_ignore_ascii_case(&a.codec)) {
                "copy".to_string()
            } else {
                ap.compat.codecs[0].clone()
            };
            let per_channel = ap.bitrate_per_channel.min(COMPAT_CHANNEL_KBPS);
            (
                codec,
                a.channels,
                a.channels * per_channel,
                ap.compat.filter.clone(),
            )
        } else {
            let mut codec = if ap
                .codecs
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&a.codec))
            {
                "copy".to_string()
            } else {
                ap.codecs[0].clone()
            };

            let (channels, mut bitrate) = match ap.max_channels {
                Some(cap) if a.channels > cap => {
                    // A copy can never survive capping.
                    if codec == "copy" {
                        codec = ap.codecs[0].clone();
                        if codec == "copy" {
                            // Some configs list "copy" as the first codec.
                            codec = "aac".to_string();
                        }
                    }
                    (cap, cap * ap.bitrate_per_channel)
                }
                _ => (a.channels, a.channels * ap.bitrate_per_channel),
            };

            if ap.bitrate_per_channel == 0 {
                bitrate = match a.bit_rate {
                    Some(source) => (source / 1000) as u32,
                    None => {
                        tracing::warn!(
                            stream = a.index,
                            "source bitrate unknown, defaulting to {} per channel",
                            FALLBACK_CHANNEL_KBPS
                        );
                        a.channels * FALLBACK_CHANNEL_KBPS
                    }
                };
            }

            (codec, channels, bitrate, ap.filter.clone())
        };

        if compat_enabled && ap.compat.first_only {
            compat_enabled = false;
        }

        let is_copy = codec == "copy";
        let mut primary = AudioDecision {
            map: a.index,
            codec,
            channels: (!is_copy).then_some(channels),
            bitrate: (!is_copy).then_some(bitrate),
            sample_rate: if is_copy { None } else { sample_rate },
            language: language.clone(),
            filter: if is_copy { None } else { filter },
            bsf: None,
            strict: None,
            default: decisions.is_empty(),
        };
        if is_copy && a.codec.eq_ignore_ascii_case("aac") && ap.adts_to_asc {
            primary.bsf = Some("aac_adtstoasc".to_string());
        }
        if is_copy && a.codec.eq_ignore_ascii_case("flac") && policy.is_mp4() {
            // FLAC in MP4 is still experimental.
            primary.strict = Some("-2".to_string());
        }

        tracing::debug!(
            stream = a.index,
            codec = %primary.codec,
            channels = ?primary.channels,
            bitrate = ?primary.bitrate,
            default = primary.default,
            "audio decision"
        );
        let primary_is_copy = is_copy;
        decisions.push(primary);

        if let Some(mut compat) = compat_pending.take() {
            compat.default = false;
            tracing::info!(
                stream = a.index,
                "creating stereo compatibility stream after the primary"
            );
            decisions.push(compat);
        }

        if copy_original && !primary_is_copy && !policy.force_convert {
            tracing::info!(stream = a.index, codec = %a.codec, "keeping a copy of the original audio track");
            let strict = (a.codec.eq_ignore_ascii_case("flac") && policy.is_mp4())
                .then(|| "-2".to_string());
            decisions.push(AudioDecision {
                map: a.index,
                codec: "copy".to_string(),
                channels: None,
                bitrate: None,
                sample_rate: None,
                language: language.clone(),
                filter: None,
                bsf: None,
                strict,
                default: false,
            });
        }
    }

    decisions
}
