use super::{bearer, check_status, decode, PlatformClient};
use crate::catalog::TrackCatalog;
use crate::config::Credentials;
use crate::error::{PlatformError, Result};
use crate::models::{PlaylistSummary, Service, Track};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const DEFAULT_BATCH_URL: &str = "https://www.googleapis.com/batch/youtube/v3";
pub const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/youtube"];

/// playlistItems.delete takes a single item id.
pub const REMOVE_BATCH: usize = 1;
/// Inserts per batch request.
pub const ADD_BATCH: usize = 25;
const PAGE_LIMIT: &str = "50";
const BATCH_BOUNDARY: &str = "batch_playlistty";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
struct ListResponse<T> {
    #[serde(default)]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResource {
    id: String,
    #[serde(default)]
    snippet: PlaylistSnippet,
}

#[derive(Debug, Default, Deserialize)]
struct PlaylistSnippet {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemResource {
    id: String,
    #[serde(default)]
    snippet: PlaylistItemSnippet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    video_owner_channel_title: String,
    #[serde(default)]
    resource_id: ResourceId,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: SearchResultId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertPlaylistRequest<'a> {
    snippet: InsertPlaylistSnippet<'a>,
    status: PlaylistStatus,
}

#[derive(Debug, Serialize)]
struct InsertPlaylistSnippet<'a> {
    title: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistStatus {
    privacy_status: &'static str,
}

#[derive(Debug, Deserialize)]
struct InsertedResource {
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertItemRequest<'a> {
    snippet: InsertItemSnippet<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertItemSnippet<'a> {
    playlist_id: &'a str,
    resource_id: ResourceId,
    position: usize,
}

/// Auto-generated music channels are named "<Artist> - Topic".
fn artist_from_channel(channel: &str) -> String {
    channel.trim_end_matches(" - Topic").to_string()
}

/// YouTube Data API v3 client.
/// The API base may be overridden by the YOUTUBE_API_BASE env var or `with_api_base` (tests).
pub struct YoutubeClient {
    client: Client,
    creds: Credentials,
    api_base: String,
    batch_url: String,
}

impl YoutubeClient {
    pub fn new(creds: Credentials) -> Self {
        let (api_base, batch_url) = match env::var("YOUTUBE_API_BASE") {
            Ok(base) => {
                let base = base.trim_end_matches('/').to_string();
                let batch = format!("{}/batch", base);
                (base, batch)
            }
            Err(_) => (DEFAULT_API_BASE.to_string(), DEFAULT_BATCH_URL.to_string()),
        };
        Self {
            client: Client::new(),
            creds,
            api_base,
            batch_url,
        }
    }

    /// Point both the REST and the batch endpoint at `base` (`<base>/batch`).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self.batch_url = format!("{}/batch", self.api_base);
        self
    }

    fn auth(&self) -> String {
        bearer(&self.creds.token)
    }

    /// GET `<base>/<resource>` with `params`, following `nextPageToken`
    /// until the API stops returning one.
    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        resource: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let url = format!("{}/{}", self.api_base, resource);
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let mut query: Vec<(&str, &str)> = params.to_vec();
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let resp = self
                .client
                .get(&url)
                .header(AUTHORIZATION, self.auth())
                .query(&query)
                .send()
                .await?;
            let page: ListResponse<T> = decode(resp).await?;
            pages += 1;
            out.extend(page.items);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }
        debug!("youtube: read {} page(s) of {}, {} item(s)", pages, resource, out.len());
        Ok(out)
    }

    async fn playlist_items(&self, playlist_id: &str) -> Result<Vec<PlaylistItemResource>> {
        self.get_all_pages(
            "playlistItems",
            &[("part", "snippet"), ("maxResults", PAGE_LIMIT), ("playlistId", playlist_id)],
        )
        .await
    }

    /// multipart/mixed body with one playlistItems.insert per part. Parts of
    /// a batch may run in any order, so each insert carries its position.
    fn batch_body(playlist_id: &str, ids: &[String], position: usize) -> Result<String> {
        let mut body = String::new();
        for (i, video_id) in ids.iter().enumerate() {
            let insert = InsertItemRequest {
                snippet: InsertItemSnippet {
                    playlist_id,
                    resource_id: ResourceId {
                        kind: "youtube#video".into(),
                        video_id: video_id.clone(),
                    },
                    position: position + i,
                },
            };
            let json = serde_json::to_string(&insert)?;
            body.push_str(&format!("--{}\r\n", BATCH_BOUNDARY));
            body.push_str("Content-Type: application/http\r\n");
            body.push_str(&format!("Content-ID: <item{}>\r\n\r\n", i + 1));
            body.push_str("POST /youtube/v3/playlistItems?part=snippet\r\n");
            body.push_str("Content-Type: application/json\r\n\r\n");
            body.push_str(&json);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{}--\r\n", BATCH_BOUNDARY));
        Ok(body)
    }

    /// Status codes of the embedded responses of a batch reply.
    fn batch_part_statuses(reply: &str) -> Vec<u16> {
        reply
            .lines()
            .filter_map(|l| l.strip_prefix("HTTP/1.1 "))
            .filter_map(|rest| rest.split_whitespace().next())
            .filter_map(|code| code.parse().ok())
            .collect()
    }
}

#[async_trait]
impl PlatformClient for YoutubeClient {
    fn service(&self) -> Service {
        Service::Youtube
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
            .get(format!("{}/channels", self.api_base))
            .header(AUTHORIZATION, self.auth())
            .query(&[("part", "id"), ("mine", "true")])
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn list_playlists(&self) -> Result<Vec<PlaylistSummary>> {
        let items: Vec<PlaylistResource> = self
            .get_all_pages(
                "playlists",
                &[("part", "snippet"), ("mine", "true"), ("maxResults", PAGE_LIMIT)],
            )
            .await?;
        Ok(items
            .into_iter()
            .map(|p| PlaylistSummary { id: p.id, title: p.snippet.title })
            .collect())
    }

    async fn fetch_tracks(&self, playlist_id: &str) -> Result<TrackCatalog> {
        let items = self.playlist_items(playlist_id).await?;
        let mut catalog = TrackCatalog::new(Service::Youtube, playlist_id);
        for item in items {
            let s = item.snippet;
            // "Deleted video" / "Private video" entries have no owner channel
            if s.video_owner_channel_title.is_empty() {
                debug!("youtube: skipping unavailable item '{}' ({})", s.title, item.id);
                continue;
            }
            let artist = artist_from_channel(&s.video_owner_channel_title);
            catalog
                .tracks
                .push(Track::new(s.title, vec![artist], s.resource_id.video_id));
        }
        Ok(catalog)
    }

    async fn search_track(&self, name: &str, artist: &str) -> Result<Option<String>> {
        let q = format!("{} {}", name, artist);
        let resp = self
            .client
            .get(format!("{}/search", self.api_base))
            .header(AUTHORIZATION, self.auth())
            .query(&[
                ("part", "snippet"),
                ("maxResults", "1"),
                ("q", q.trim()),
                ("type", "video"),
            ])
            .send()
            .await?;
        let result: ListResponse<SearchResult> = decode(resp).await?;
        Ok(result
            .items
            .into_iter()
            .next()
            .and_then(|r| r.id.video_id)
            .filter(|id| !id.is_empty()))
    }

    async fn create_playlist(&self, title: &str, description: &str, public: bool) -> Result<String> {
        let body = InsertPlaylistRequest {
            snippet: InsertPlaylistSnippet { title, description },
            status: PlaylistStatus {
                privacy_status: if public { "public" } else { "private" },
            },
        };
        let resp = self
            .client
            .post(format!("{}/playlists", self.api_base))
            .header(AUTHORIZATION, self.auth())
            .query(&[("part", "snippet,status")])
            .json(&body)
            .send()
            .await?;
        let created: InsertedResource = decode(resp).await?;
        if created.id.is_empty() {
            return Err(PlatformError::Decode("created playlist has no id".into()));
        }
        Ok(created.id)
    }

    async fn playlist_item_handles(&self, playlist_id: &str) -> Result<Vec<String>> {
        Ok(self
            .playlist_items(playlist_id)
            .await?
            .into_iter()
            .map(|item| item.id)
            .collect())
    }

    async fn remove_items(&self, _playlist_id: &str, handles: &[String]) -> Result<()> {
        for handle in handles {
            let resp = self
                .client
                .delete(format!("{}/playlistItems", self.api_base))
                .header(AUTHORIZATION, self.auth())
                .query(&[("id", handle.as_str())])
                .send()
                .await?;
            check_status(resp).await?;
        }
        Ok(())
    }

    async fn add_items(&self, playlist_id: &str, ids: &[String], position: usize) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let body = Self::batch_body(playlist_id, ids, position)?;
        let resp = self
            .client
            .post(&self.batch_url)
            .header(AUTHORIZATION, self.auth())
            .header(
                CONTENT_TYPE,
                format!("multipart/mixed; boundary={}", BATCH_BOUNDARY),
            )
            .body(body)
            .send()
            .await?;
        let reply = check_status(resp).await?.text().await?;
        let statuses = Self::batch_part_statuses(&reply);
        if let Some(bad) = statuses.iter().find(|s| !(200..300).contains(*s)) {
            let failed = statuses.iter().filter(|s| !(200..300).contains(*s)).count();
            return Err(PlatformError::Http {
                status: *bad,
                body: format!("{} of {} inserts in batch failed", failed, ids.len()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_suffix_is_stripped() {
        assert_eq!(artist_from_channel("Daft Punk - Topic"), "Daft Punk");
        assert_eq!(artist_from_channel("Some Channel"), "Some Channel");
    }

    #[test]
    fn batch_reply_statuses_are_collected() {
        let reply = "--batch_x\r\nContent-Type: application/http\r\n\r\nHTTP/1.1 200 OK\r\n\r\n{}\r\n--batch_x\r\n\r\nHTTP/1.1 404 Not Found\r\n\r\n{}\r\n--batch_x--";
        assert_eq!(YoutubeClient::batch_part_statuses(reply), vec![200, 404]);
    }

    #[test]
    fn batch_inserts_are_pinned_to_their_window_offset() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let body = YoutubeClient::batch_body("PL1", &ids, 25).unwrap();
        let parts: Vec<(String, u64)> = body
            .lines()
            .filter(|l| l.starts_with('{'))
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).unwrap();
                let snippet = &v["snippet"];
                (
                    snippet["resourceId"]["videoId"].as_str().unwrap().to_string(),
                    snippet["position"].as_u64().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            parts,
            vec![("a".to_string(), 25), ("b".to_string(), 26), ("c".to_string(), 27)]
        );
    }

    #[test]
    fn batch_body_has_one_part_per_video() {
        let ids = vec!["v1".to_string(), "v2".to_string()];
        let body = YoutubeClient::batch_body("PL1", &ids, 0).unwrap();
        assert_eq!(body.matches("POST /youtube/v3/playlistItems").count(), 2);
        assert!(body.contains(r#""videoId":"v2""#));
        assert!(body.ends_with("--batch_playlistty--\r\n"));
    }
}
