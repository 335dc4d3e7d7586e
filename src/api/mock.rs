use super::PlatformClient;
use crate::catalog::TrackCatalog;
use crate::error::{PlatformError, Result};
use crate::models::{PlaylistSummary, Service, Track};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::info;

/// One recorded call against a `MockClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Validate { token: String },
    ListPlaylists,
    FetchTracks { playlist_id: String },
    Search { name: String, artist: String },
    Create { title: String, description: String, public: bool },
    ListItems { playlist_id: String },
    Remove { playlist_id: String, handles: Vec<String> },
    Add { playlist_id: String, ids: Vec<String>, position: usize },
}

pub type CallLog = Arc<Mutex<Vec<MockCall>>>;

/// In-memory client used in tests. Every call is appended to a shared log
/// that stays readable after the client has been moved into a `Migrator`.
pub struct MockClient {
    service: Service,
    token: String,
    accepted_token: Option<String>,
    remove_limit: usize,
    add_limit: usize,
    playlists: Vec<PlaylistSummary>,
    tracks: HashMap<String, Vec<Track>>,
    existing_items: HashMap<String, Vec<String>>,
    search_results: HashMap<(String, String), String>,
    failing_adds: HashSet<usize>,
    created_id: String,
    log: CallLog,
}

impl MockClient {
    pub fn new(service: Service) -> Self {
        Self {
            service,
            token: "mock-token".into(),
            accepted_token: None,
            remove_limit: 100,
            add_limit: 25,
            playlists: Vec::new(),
            tracks: HashMap::new(),
            existing_items: HashMap::new(),
            search_results: HashMap::new(),
            failing_adds: HashSet::new(),
            created_id: "mock-created".into(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_limits(mut self, remove: usize, add: usize) -> Self {
        self.remove_limit = remove;
        self.add_limit = add;
        self
    }

    /// Only `token` passes `validate_token`; anything else is an auth error.
    pub fn accepting_token(mut self, token: &str) -> Self {
        self.accepted_token = Some(token.to_string());
        self
    }

    pub fn with_playlist(mut self, id: &str, title: &str) -> Self {
        self.playlists.push(PlaylistSummary { id: id.into(), title: title.into() });
        self
    }

    pub fn with_tracks(mut self, playlist_id: &str, tracks: Vec<Track>) -> Self {
        self.tracks.insert(playlist_id.into(), tracks);
        self
    }

    /// Seed `count` existing items in a destination playlist.
    pub fn with_existing_items(mut self, playlist_id: &str, count: usize) -> Self {
        let items = (0..count).map(|i| format!("item-{}", i)).collect();
        self.existing_items.insert(playlist_id.into(), items);
        self
    }

    pub fn with_search_result(mut self, name: &str, artist: &str, id: &str) -> Self {
        self.search_results.insert((name.into(), artist.into()), id.into());
        self
    }

    /// Make the n-th `add_items` call (1-based) fail.
    pub fn failing_add(mut self, n: usize) -> Self {
        self.failing_adds.insert(n);
        self
    }

    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    fn record(&self, call: MockCall) -> usize {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.push(call);
        log.len()
    }

    fn add_calls(&self) -> usize {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.iter().filter(|c| matches!(c, MockCall::Add { .. })).count()
    }
}

#[async_trait]
impl PlatformClient for MockClient {
    fn service(&self) -> Service {
        self.service
    }

    fn destructive_batch_size(&self) -> usize {
        self.remove_limit
    }

    fn additive_batch_size(&self) -> usize {
        self.add_limit
    }

    fn set_token(&mut self, token: String) {
        self.token = token;
    }

    async fn validate_token(&self) -> Result<()> {
        self.record(MockCall::Validate { token: self.token.clone() });
        match &self.accepted_token {
            Some(t) if *t != self.token => Err(PlatformError::Auth("401 Unauthorized".into())),
            _ => Ok(()),
        }
    }

    async fn list_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        self.record(MockCall::ListPlaylists);
        Ok(self.playlists.clone())
    }

    async fn fetch_tracks(&self, playlist_id: &str) -> Result<TrackCatalog> {
        self.record(MockCall::FetchTracks { playlist_id: playlist_id.into() });
        let tracks = self
            .tracks
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("playlist {}", playlist_id)))?;
        let mut catalog = TrackCatalog::new(self.service, playlist_id);
        catalog.tracks = tracks;
        Ok(catalog)
    }

    async fn search_track(&self, name: &str, artist: &str) -> Result<Option<String>> {
        self.record(MockCall::Search { name: name.into(), artist: artist.into() });
        info!("MockClient: search {} - {}", name, artist);
        Ok(self.search_results.get(&(name.to_string(), artist.to_string())).cloned())
    }

    async fn create_playlist(&self, title: &str, description: &str, public: bool) -> Result<String> {
        self.record(MockCall::Create {
            title: title.into(),
            description: description.into(),
            public,
        });
        Ok(self.created_id.clone())
    }

    async fn playlist_item_handles(&self, playlist_id: &str) -> Result<Vec<String>> {
        self.record(MockCall::ListItems { playlist_id: playlist_id.into() });
        Ok(self.existing_items.get(playlist_id).cloned().unwrap_or_default())
    }

    async fn remove_items(&self, playlist_id: &str, handles: &[String]) -> Result<()> {
        self.record(MockCall::Remove {
            playlist_id: playlist_id.into(),
            handles: handles.to_vec(),
        });
        Ok(())
    }

    async fn add_items(&self, playlist_id: &str, ids: &[String], position: usize) -> Result<()> {
        self.record(MockCall::Add {
            playlist_id: playlist_id.into(),
            ids: ids.to_vec(),
            position,
        });
        if self.failing_adds.contains(&self.add_calls()) {
            return Err(PlatformError::Http { status: 500, body: "mock failure".into() });
        }
        Ok(())
    }
}
