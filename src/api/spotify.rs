use super::{bearer, check_status, decode, PlatformClient};
use crate::catalog::TrackCatalog;
use crate::config::Credentials;
use crate::error::{PlatformError, Result};
use crate::models::{PlaylistSummary, Service, Track};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use log::debug;

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
pub const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const SCOPES: &[&str] = &[
    "playlist-modify-public",
    "playlist-modify-private",
    "playlist-read-private",
    "playlist-read-collaborative",
];

/// Spotify rejects more than 100 items per add/remove request.
pub const REMOVE_BATCH: usize = 100;
pub const ADD_BATCH: usize = 100;
const PAGE_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Paging<T> {
    #[serde(default)]
    items: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistObject {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    // null for tracks that were removed from the catalog
    track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    #[serde(default)]
    uri: String,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Paging<TrackObject>,
}

#[derive(Debug, Serialize)]
struct CreatePlaylistRequest<'a> {
    name: &'a str,
    description: &'a str,
    public: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedPlaylist {
    id: String,
}

#[derive(Debug, Serialize)]
struct AddTracksRequest {
    uris: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RemoveTracksRequest<'a> {
    tracks: Vec<UriRef<'a>>,
}

#[derive(Debug, Serialize)]
struct UriRef<'a> {
    uri: &'a str,
}

/// Spotify Web API client.
/// The API base may be overridden by the SPOTIFY_API_BASE env var or `with_api_base` (tests).
pub struct SpotifyClient {
    client: Client,
    creds: Credentials,
    api_base: String,
}

impl SpotifyClient {
    pub fn new(creds: Credentials) -> Self {
        Self {
            client: Client::new(),
            creds,
            api_base: env::var("SPOTIFY_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.into()),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn auth(&self) -> String {
        bearer(&self.creds.token)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.auth())
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        decode(resp).await
    }

    /// Follow `next` links until Spotify stops returning one.
    async fn get_all_pages<T: DeserializeOwned>(&self, first: String) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let mut next = Some(first);
        let mut pages = 0usize;
        while let Some(url) = next {
            let page: Paging<T> = self.get_json(&url).await?;
            pages += 1;
            out.extend(page.items);
            next = page.next.filter(|n| !n.is_empty());
        }
        debug!("spotify: read {} page(s), {} item(s)", pages, out.len());
        Ok(out)
    }

    async fn user_id(&self) -> Result<String> {
        if !self.creds.user_id.is_empty() {
            return Ok(self.creds.user_id.clone());
        }
        let me: UserObject = self.get_json(&format!("{}/me", self.api_base)).await?;
        Ok(me.id)
    }

    fn tracks_url(&self, playlist_id: &str) -> String {
        format!(
            "{}/playlists/{}/tracks?limit={}",
            self.api_base,
            urlencoding::encode(playlist_id),
            PAGE_LIMIT
        )
    }

    fn tracks_url_bare(&self, playlist_id: &str) -> String {
        format!("{}/playlists/{}/tracks", self.api_base, urlencoding::encode(playlist_id))
    }

    fn track_uri(id: &str) -> String {
        if id.starts_with("spotify:") {
            id.to_string()
        } else {
            format!("spotify:track:{}", id)
        }
    }
}

#[async_trait]
impl PlatformClient for SpotifyClient {
    fn service(&self) -> Service {
        Service::Spotify
    }

    fn destructive_batch_size(&self) -> usize {
        REMOVE_BATCH
    }

    fn additive_batch_size(&self) -> usize {
        ADD_BATCH
    }

    fn set_token(&mut self, token: String) {
        self.creds.token = token;
    }

    async fn validate_token(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/me", self.api_base))
            .header(AUTHORIZATION, self.auth())
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn list_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        let first = if self.creds.user_id.is_empty() {
            format!("{}/me/playlists?limit=50", self.api_base)
        } else {
            format!(
                "{}/users/{}/playlists?limit=50",
                self.api_base,
                urlencoding::encode(&self.creds.user_id)
            )
        };
        let items: Vec<PlaylistObject> = self.get_all_pages(first).await?;
        Ok(items
            .into_iter()
            .map(|p| PlaylistSummary { id: p.id, title: p.name })
            .collect())
    }

    async fn fetch_tracks(&self, playlist_id: &str) -> Result<TrackCatalog> {
        let items: Vec<PlaylistItem> = self.get_all_pages(self.tracks_url(playlist_id)).await?;
        let mut catalog = TrackCatalog::new(Service::Spotify, playlist_id);
        for track in items.into_iter().filter_map(|it| it.track) {
            let artists = track.artists.into_iter().map(|a| a.name).collect();
            catalog
                .tracks
                .push(Track::new(track.name, artists, track.id.unwrap_or_default()));
        }
        Ok(catalog)
    }

    async fn search_track(&self, name: &str, artist: &str) -> Result<Option<String>> {
        let q = format!("track:{} artist:{}", name, artist);
        let url = format!(
            "{}/search?q={}&type=track&limit=1",
            self.api_base,
            urlencoding::encode(&q)
        );
        let result: SearchResponse = self.get_json(&url).await?;
        Ok(result
            .tracks
            .items
            .into_iter()
            .next()
            .and_then(|t| t.id)
            .filter(|id| !id.is_empty()))
    }

    async fn create_playlist(&self, title: &str, description: &str, public: bool) -> Result<String> {
        let user_id = self.user_id().await?;
        let url = format!(
            "{}/users/{}/playlists",
            self.api_base,
            urlencoding::encode(&user_id)
        );
        let body = CreatePlaylistRequest { name: title, description, public };
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await?;
        let created: CreatedPlaylist = decode(resp).await?;
        if created.id.is_empty() {
            return Err(PlatformError::Decode("created playlist has no id".into()));
        }
        Ok(created.id)
    }

    async fn playlist_item_handles(&self, playlist_id: &str) -> Result<Vec<String>> {
        let items: Vec<PlaylistItem> = self.get_all_pages(self.tracks_url(playlist_id)).await?;
        Ok(items
            .into_iter()
            .filter_map(|it| it.track)
            .map(|t| t.uri)
            .filter(|uri| !uri.is_empty())
            .collect())
    }

    async fn remove_items(&self, playlist_id: &str, handles: &[String]) -> Result<()> {
        let url = self.tracks_url_bare(playlist_id);
        let body = RemoveTracksRequest {
            tracks: handles.iter().map(|u| UriRef { uri: u }).collect(),
        };
        let resp = self
            .client
            .delete(&url)
            .header(AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    // requests are sequential and each keeps its own order, so appending
    // without a position reproduces the source order
    async fn add_items(&self, playlist_id: &str, ids: &[String], _position: usize) -> Result<()> {
        let url = self.tracks_url_bare(playlist_id);
        let body = AddTracksRequest {
            uris: ids.iter().map(|id| Self::track_uri(id)).collect(),
        };
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}
