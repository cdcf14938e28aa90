//! Subtitle track selection.
//!
//! Picks the best track from a platform's listing: human-authored tracks in
//! the caller's language order, then platform-translated ("ai-" keys), then
//! auto-captions, with any-track fallbacks before giving up.

use serde::{Deserialize, Serialize};

/// Where a track's cue data lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrackPayload {
    /// Cue text embedded directly in the track listing.
    Inline { data: String, ext: Option<String> },
    /// Cue data fetched from the provider on demand.
    Remote { url: String, ext: Option<String> },
}

/// One subtitle track as advertised by the source platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleTrack {
    /// Language key: a plain code ("en"), a region-qualified code
    /// ("zh-Hans"), or a platform-translated key ("ai-en").
    pub lang: String,
    pub payload: TrackPayload,
}

/// Track listing for one video. Listing order is preserved; the
/// any-track fallbacks pick the first entry as listed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtitleCatalog {
    pub title: Option<String>,
    /// Uploader-provided tracks
    pub manual: Vec<SubtitleTrack>,
    /// Platform-generated captions
    pub auto: Vec<SubtitleTrack>,
}

impl SubtitleCatalog {
    pub fn is_empty(&self) -> bool {
        self.manual.is_empty() && self.auto.is_empty()
    }
}

/// Which listing a chosen track came from. The two carry differently
/// shaped payload metadata on some platforms, so callers need to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOrigin {
    Manual,
    Auto,
}

/// The selector's pick.
#[derive(Debug, Clone)]
pub struct ChosenTrack<'a> {
    pub lang: &'a str,
    pub origin: TrackOrigin,
    pub track: &'a SubtitleTrack,
}

impl ChosenTrack<'_> {
    pub fn is_auto(&self) -> bool {
        self.origin == TrackOrigin::Auto
    }
}

/// Overlay comment track some platforms list alongside subtitles; it is
/// never transcript material.
const EXCLUDED_TRACK: &str = "danmaku";

/// Pick the best available subtitle track, or `None` when the catalog has
/// nothing usable. Absence is a normal outcome, not an error.
pub fn choose_best_subtitle<'a>(
    catalog: &'a SubtitleCatalog,
    preferred: &[String],
) -> Option<ChosenTrack<'a>> {
    let manual: Vec<&SubtitleTrack> = catalog
        .manual
        .iter()
        .filter(|t| t.lang != EXCLUDED_TRACK)
        .collect();
    let auto: Vec<&SubtitleTrack> = catalog
        .auto
        .iter()
        .filter(|t| t.lang != EXCLUDED_TRACK)
        .collect();

    // Human-authored tracks in preference order.
    for lang in preferred {
        if let Some(track) = find_plain(&manual, lang) {
            return Some(chosen(track, TrackOrigin::Manual));
        }
    }

    // Platform-translated manual tracks, same order.
    for lang in preferred {
        if let Some(track) = find_translated(&manual, lang) {
            return Some(chosen(track, TrackOrigin::Manual));
        }
    }

    // Auto-captions, either key shape.
    for lang in preferred {
        if let Some(track) = find_any(&auto, lang) {
            return Some(chosen(track, TrackOrigin::Auto));
        }
    }

    // No language matched: any manual track beats any auto track.
    if let Some(track) = manual.first() {
        return Some(chosen(track, TrackOrigin::Manual));
    }
    if let Some(track) = auto.first() {
        return Some(chosen(track, TrackOrigin::Auto));
    }

    None
}

fn chosen(track: &SubtitleTrack, origin: TrackOrigin) -> ChosenTrack<'_> {
    ChosenTrack {
        lang: &track.lang,
        origin,
        track,
    }
}

/// Non-translated keys: an exact key anywhere in the listing wins before
/// any prefix variant ("zh" takes "zh-Hans") is considered.
fn find_plain<'a>(tracks: &[&'a SubtitleTrack], lang: &str) -> Option<&'a SubtitleTrack> {
    tracks
        .iter()
        .find(|t| !t.lang.starts_with("ai-") && t.lang == lang)
        .or_else(|| {
            tracks
                .iter()
                .find(|t| !t.lang.starts_with("ai-") && t.lang.starts_with(lang))
        })
        .copied()
}

/// Keys behind the "ai-" translation prefix: exact `"ai-" + lang` wins
/// before any prefix variant.
fn find_translated<'a>(tracks: &[&'a SubtitleTrack], lang: &str) -> Option<&'a SubtitleTrack> {
    tracks
        .iter()
        .find(|t| t.lang.strip_prefix("ai-") == Some(lang))
        .or_else(|| {
            tracks.iter().find(|t| {
                t.lang
                    .strip_prefix("ai-")
                    .is_some_and(|rest| rest.starts_with(lang))
            })
        })
        .copied()
}

/// Either key shape, plain keys before translated ones.
fn find_any<'a>(tracks: &[&'a SubtitleTrack], lang: &str) -> Option<&'a SubtitleTrack> {
    find_plain(tracks, lang).or_else(|| find_translated(tracks, lang))
}
