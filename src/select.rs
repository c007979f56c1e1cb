//! Format selection policy.
//!
//! Pure decision logic over a rendition catalog, written as an explicit
//! chain of named rules so the precedence stays auditable rule-by-rule.
//!
//! Video, first match wins: a combined 1080p rendition, then the
//! best-bitrate 1080p video, then the tallest video available. Audio (only
//! when the chosen video carries none): the best medium-quality mp4
//! audio-only track — on this source that is typically the original encode,
//! a "higher" class is usually a transcode — falling back to the best
//! audio-only track of any kind.

use crate::catalog::{AudioQualityClass, Rendition};
use crate::error::DeliveryError;

/// Outcome of selection. `audio` is populated exactly when the chosen video
/// rendition lacks embedded audio, so a merge is needed iff it is `Some`.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub video: Rendition,
    pub audio: Option<Rendition>,
}

impl Selection {
    pub fn needs_merge(&self) -> bool {
        self.audio.is_some()
    }
}

/// Picks one video rendition and, when that rendition is silent, one audio
/// rendition to merge with it.
///
/// Fails with [`DeliveryError::NoSuitableVideo`] when the catalog has no
/// video track at all, and with [`DeliveryError::NoSuitableAudio`] when a
/// merge would be required but no audio-only rendition exists — a muted
/// file is never delivered silently.
pub fn select(catalog: &[Rendition]) -> Result<Selection, DeliveryError> {
    let video = combined_1080(catalog)
        .or_else(|| best_1080_by_bitrate(catalog))
        .or_else(|| tallest_video(catalog))
        .ok_or(DeliveryError::NoSuitableVideo)?;

    if video.has_audio {
        return Ok(Selection {
            video: video.clone(),
            audio: None,
        });
    }

    let audio = best_audio_medium_mp4(catalog)
        .or_else(|| best_audio_any(catalog))
        .ok_or(DeliveryError::NoSuitableAudio)?;

    Ok(Selection {
        video: video.clone(),
        audio: Some(audio.clone()),
    })
}

/// Rule 1: 1080p with audio already embedded; no merge needed.
fn combined_1080(catalog: &[Rendition]) -> Option<&Rendition> {
    catalog
        .iter()
        .find(|r| r.has_video && r.has_audio && r.height == Some(1080))
}

/// Rule 2: best 1080p by video bitrate, embedded audio or not.
fn best_1080_by_bitrate(catalog: &[Rendition]) -> Option<&Rendition> {
    catalog
        .iter()
        .filter(|r| r.has_video && r.height == Some(1080))
        .max_by(|a, b| cmp_bitrate(a.video_bitrate, b.video_bitrate))
}

/// Rule 3: tallest video available. Tie order is unspecified.
fn tallest_video(catalog: &[Rendition]) -> Option<&Rendition> {
    catalog
        .iter()
        .filter(|r| r.has_video)
        .max_by_key(|r| r.height.unwrap_or(0))
}

fn is_audio_only(r: &Rendition) -> bool {
    r.has_audio && !r.has_video
}

/// Audio rule 1: medium-quality mp4 audio-only track, best bitrate.
fn best_audio_medium_mp4(catalog: &[Rendition]) -> Option<&Rendition> {
    catalog
        .iter()
        .filter(|r| {
            is_audio_only(r)
                && r.audio_quality == AudioQualityClass::Medium
                && r.container == "mp4"
        })
        .max_by(|a, b| cmp_bitrate(a.audio_bitrate, b.audio_bitrate))
}

/// Audio rule 2 (fallback): any audio-only track, best bitrate. This accepts
/// lower-fidelity tracks when rule 1 finds nothing; see DESIGN.md.
fn best_audio_any(catalog: &[Rendition]) -> Option<&Rendition> {
    catalog
        .iter()
        .filter(|r| is_audio_only(r))
        .max_by(|a, b| cmp_bitrate(a.audio_bitrate, b.audio_bitrate))
}

fn cmp_bitrate(a: Option<f64>, b: Option<f64>) -> std::cmp::Ordering {
    a.unwrap_or(0.0).total_cmp(&b.unwrap_or(0.0))
}
