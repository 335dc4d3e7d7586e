//! Persisted playlist snapshot.
//!
//! One JSON file per `(platform, playlist id)` under the storage directory,
//! always rewritten in full.

use crate::models::{Service, Track};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk shape of one track.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogEntry {
    name: String,
    /// Artists joined with ", "
    #[serde(default)]
    artist: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    artists: Vec<String>,
    /// Source platform id
    #[serde(default)]
    id: String,
    #[serde(default)]
    target_id: String,
}

impl From<&Track> for CatalogEntry {
    fn from(t: &Track) -> Self {
        Self {
            name: t.name.clone(),
            artist: t.joined_artists(),
            artists: t.artists.clone(),
            id: t.source_id.clone(),
            target_id: t.target_id.clone().unwrap_or_default(),
        }
    }
}

impl From<CatalogEntry> for Track {
    fn from(e: CatalogEntry) -> Self {
        let artists = if !e.artists.is_empty() {
            e.artists
        } else if e.artist.is_empty() {
            Vec::new()
        } else {
            e.artist.split(", ").map(str::to_string).collect()
        };
        Track {
            name: e.name,
            artists,
            source_id: e.id,
            target_id: if e.target_id.is_empty() { None } else { Some(e.target_id) },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackCatalog {
    pub service: Service,
    pub playlist_id: String,
    pub tracks: Vec<Track>,
}

impl TrackCatalog {
    pub fn new(service: Service, playlist_id: impl Into<String>) -> Self {
        Self {
            service,
            playlist_id: playlist_id.into(),
            tracks: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// `<storage_dir>/<platform>/<playlist id>.json`
    pub fn path_in(&self, storage_dir: &Path) -> PathBuf {
        Self::path_for(storage_dir, self.service, &self.playlist_id)
    }

    pub fn path_for(storage_dir: &Path, service: Service, playlist_id: &str) -> PathBuf {
        storage_dir
            .join(service.as_str())
            .join(format!("{}.json", playlist_id))
    }

    /// Destination ids in catalog order, unresolved tracks skipped.
    pub fn resolved_ids(&self) -> Vec<String> {
        self.tracks
            .iter()
            .filter(|t| t.is_resolved())
            .filter_map(|t| t.target_id.clone())
            .collect()
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| !t.is_resolved())
    }

    /// Overwrite the snapshot file, returning its path.
    pub fn save(&self, storage_dir: &Path) -> Result<PathBuf> {
        let path = self.path_in(storage_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating catalog directory {}", parent.display()))?;
        }
        let entries: Vec<CatalogEntry> = self.tracks.iter().map(CatalogEntry::from).collect();
        let data = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&path, data)
            .with_context(|| format!("writing catalog {}", path.display()))?;
        Ok(path)
    }

    pub fn load(storage_dir: &Path, service: Service, playlist_id: &str) -> Result<Self> {
        let path = Self::path_for(storage_dir, service, playlist_id);
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&data)
            .with_context(|| format!("parsing catalog {}", path.display()))?;
        Ok(Self {
            service,
            playlist_id: playlist_id.to_string(),
            tracks: entries.into_iter().map(Track::from).collect(),
        })
    }
}
