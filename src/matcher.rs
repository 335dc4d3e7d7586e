//! Best-effort track resolution against the destination catalog.

use crate::api::PlatformClient;
use crate::catalog::TrackCatalog;
use crate::models::Track;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct MatchReport {
    /// Searches issued
    pub attempted: usize,
    pub resolved: usize,
    pub unresolved: Vec<Track>,
}

/// Resolves tracks with one search each: name plus first artist, first hit
/// wins. No scoring, no second attempt.
pub struct Matcher<'a> {
    destination: &'a dyn PlatformClient,
}

impl<'a> Matcher<'a> {
    pub fn new(destination: &'a dyn PlatformClient) -> Self {
        Self { destination }
    }

    /// Search for every track without a target id. Search failures are
    /// logged and leave the track unresolved.
    pub async fn match_catalog(&self, catalog: &mut TrackCatalog) -> MatchReport {
        let mut report = MatchReport::default();
        let total = catalog.tracks.len();
        for (i, track) in catalog.tracks.iter_mut().enumerate() {
            if track.is_resolved() {
                continue;
            }
            report.attempted += 1;
            let artist = track.primary_artist().to_string();
            let found = match self.destination.search_track(&track.name, &artist).await {
                Ok(found) => found,
                Err(e) => {
                    warn!("search failed for '{}' by '{}': {}", track.name, artist, e);
                    None
                }
            };
            match found {
                Some(id) => {
                    debug!("[{}/{}] {} by {} -> {}", i + 1, total, track.name, artist, id);
                    track.target_id = Some(id);
                    report.resolved += 1;
                }
                None => {
                    info!("[{}/{}] no match for {} by {}", i + 1, total, track.name, artist);
                    track.target_id = None;
                    report.unresolved.push(track.clone());
                }
            }
        }
        report
    }
}

/// Same-platform migration: the source ids are already destination ids.
pub fn adopt_source_ids(catalog: &mut TrackCatalog) -> MatchReport {
    let mut report = MatchReport::default();
    for track in catalog.tracks.iter_mut() {
        if track.source_id.is_empty() {
            track.target_id = None;
            report.unresolved.push(track.clone());
        } else {
            track.target_id = Some(track.source_id.clone());
            report.resolved += 1;
        }
    }
    report
}
