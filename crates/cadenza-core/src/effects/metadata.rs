//! Display metadata from tags (ID3, Vorbis comments, MP4 atoms).
//!
//! Independent of playback: the tag duration shown here can disagree with
//! the engine's decoded duration, and the engine never reads it.

use std::path::Path;

use lofty::prelude::*;
use lofty::probe::Probe;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub duration_ms: Option<u64>,
}

/// Read tags from `path`. Untagged or unreadable files fall back to the
/// file stem as title with everything else empty.
pub fn read_metadata(path: &Path) -> TrackMetadata {
    let fallback_title = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Unknown")
        .to_string();

    let tagged = match Probe::open(path).and_then(|p| p.read()) {
        Ok(t) => t,
        Err(e) => {
            log::debug!("cadenza: no tags for {}: {}", path.display(), e);
            return TrackMetadata {
                title: fallback_title,
                artist: None,
                album: None,
                genre: None,
                track_number: None,
                duration_ms: None,
            };
        }
    };

    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());
    let duration_ms = Some(tagged.properties().duration().as_millis() as u64).filter(|&d| d > 0);

    TrackMetadata {
        title: tag
            .and_then(|t| t.title().map(|s| s.to_string()))
            .unwrap_or(fallback_title),
        artist: tag.and_then(|t| t.artist().map(|s| s.to_string())),
        album: tag.and_then(|t| t.album().map(|s| s.to_string())),
        genre: tag.and_then(|t| t.genre().map(|s| s.to_string())),
        track_number: tag.and_then(|t| t.track()),
        duration_ms,
    }
}
