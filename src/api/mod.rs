pub mod mock;
pub mod spotify;
pub mod youtube;

use crate::catalog::TrackCatalog;
use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::models::{PlaylistSummary, Service};
use serde::de::DeserializeOwned;

/// Client trait: the catalog and playlist operations the pipeline needs.
/// Implementations: spotify::SpotifyClient, youtube::YoutubeClient and
/// mock::MockClient for tests. Batching of mutations is done by the caller
/// through `batch::RateAwareBatcher`.
#[async_trait::async_trait]
pub trait PlatformClient: Send + Sync {
    fn service(&self) -> Service;

    /// Max items per remove request
    fn destructive_batch_size(&self) -> usize;

    /// Max items per add request
    fn additive_batch_size(&self) -> usize;

    /// Replace the bearer token (after re-authorization).
    fn set_token(&mut self, token: String);

    /// Call a "who am I" endpoint with the current token.
    async fn validate_token(&self) -> Result<()>;

    /// All playlists of the authenticated user.
    async fn list_playlists(&self) -> Result<Vec<PlaylistSummary>>;

    /// Every track of a playlist, following continuation until exhausted.
    async fn fetch_tracks(&self, playlist_id: &str) -> Result<TrackCatalog>;

    /// First search hit for `name` by `artist`, if any.
    async fn search_track(&self, name: &str, artist: &str) -> Result<Option<String>>;

    async fn create_playlist(&self, title: &str, description: &str, public: bool) -> Result<String>;

    /// Handles identifying each existing item, in the form `remove_items` takes.
    async fn playlist_item_handles(&self, playlist_id: &str) -> Result<Vec<String>>;

    /// Remove one window of item handles.
    async fn remove_items(&self, playlist_id: &str, handles: &[String]) -> Result<()>;

    /// Add one window of destination ids. `position` is the playlist index
    /// of `ids[0]`.
    async fn add_items(&self, playlist_id: &str, ids: &[String], position: usize) -> Result<()>;
}

/// Build the client for `service` from its config section. Chosen once at startup.
pub fn client_for(service: Service, cfg: &Config) -> Box<dyn PlatformClient> {
    let creds = cfg.credentials(service).clone();
    match service {
        Service::Spotify => Box::new(spotify::SpotifyClient::new(creds)),
        Service::Youtube => Box::new(youtube::YoutubeClient::new(creds)),
    }
}

pub(crate) fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Map a non-success status onto the error taxonomy.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        401 | 403 => PlatformError::Auth(format!("{} => {}", status, body)),
        404 => PlatformError::NotFound(body),
        code => PlatformError::Http { status: code, body },
    })
}

/// Check the status, then decode the body into `T`.
pub(crate) async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let resp = check_status(resp).await?;
    let text = resp.text().await?;
    Ok(serde_json::from_str(&text)?)
}
