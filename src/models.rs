use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two supported platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Spotify,
    Youtube,
}

impl Service {
    pub const ALL: [Service; 2] = [Service::Spotify, Service::Youtube];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Spotify => "spotify",
            Service::Youtube => "youtube",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spotify" => Ok(Service::Spotify),
            "yt" | "youtube" => Ok(Service::Youtube),
            other => Err(format!(
                "invalid service '{}': must be one of spotify, yt",
                other
            )),
        }
    }
}

/// One entry of a playlist snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub name: String,
    pub artists: Vec<String>,
    pub source_id: String,
    /// Destination id; `None` until matched, `Some("")` never stored.
    pub target_id: Option<String>,
}

impl Track {
    pub fn new(name: impl Into<String>, artists: Vec<String>, source_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artists,
            source_id: source_id.into(),
            target_id: None,
        }
    }

    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("")
    }

    pub fn joined_artists(&self) -> String {
        self.artists.join(", ")
    }

    pub fn is_resolved(&self) -> bool {
        self.target_id.as_deref().map_or(false, |id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub id: String,
    pub title: String,
}

/// Configuration for one migration run.
#[derive(Debug, Clone)]
pub struct MigrationJob {
    pub source_service: Service,
    pub source_playlist_id: String,
    pub target_service: Service,
    /// Existing destination playlist; ignored when `create_new` is set.
    pub target_playlist_id: String,
    pub create_new: bool,
    pub target_name: String,
    pub target_description: String,
}

pub const DEFAULT_DESCRIPTION: &str = "Made with Playlistty";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_parses_cli_aliases() {
        assert_eq!("yt".parse::<Service>().unwrap(), Service::Youtube);
        assert_eq!("Spotify".parse::<Service>().unwrap(), Service::Spotify);
        assert!("tidal".parse::<Service>().is_err());
    }

    #[test]
    fn primary_artist_ignores_the_rest() {
        let t = Track::new("Song", vec!["A".into(), "B".into()], "id1");
        assert_eq!(t.primary_artist(), "A");
        assert_eq!(t.joined_artists(), "A, B");
        assert!(!t.is_resolved());
    }
}
