//! Windowed mutations under per-platform size limits.

use crate::api::PlatformClient;
use crate::error::Result;
use std::future::Future;
use tracing::{info, warn};

/// Issues one request per window of at most `limit` ids, sequentially and in
/// order. A failed window is logged and skipped; no retry.
#[derive(Debug, Clone, Copy)]
pub struct RateAwareBatcher {
    limit: usize,
}

impl RateAwareBatcher {
    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1) }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of requests `run` issues for `n` ids.
    pub fn window_count(&self, n: usize) -> usize {
        (n + self.limit - 1) / self.limit
    }

    /// Run `op` once per window with the window's offset into `ids`.
    /// Returns how many requests were issued.
    pub async fn run<'a, F, Fut>(&self, label: &str, ids: &'a [String], mut op: F) -> usize
    where
        F: FnMut(usize, &'a [String]) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut issued = 0usize;
        for (i, window) in ids.chunks(self.limit).enumerate() {
            let offset = i * self.limit;
            let first = offset + 1;
            let last = offset + window.len();
            issued += 1;
            match op(offset, window).await {
                Ok(()) => info!("{}: items {}-{} ok", label, first, last),
                Err(e) => warn!("{}: items {}-{} failed: {}", label, first, last, e),
            }
        }
        issued
    }
}

/// Remove every existing item of `playlist_id` using the client's
/// destructive limit. Returns the number of remove requests issued.
pub async fn clear_playlist(client: &dyn PlatformClient, playlist_id: &str) -> Result<usize> {
    let handles = client.playlist_item_handles(playlist_id).await?;
    let batcher = RateAwareBatcher::new(client.destructive_batch_size());
    info!(
        "Clearing {} item(s) from {} playlist {} in {} request(s)",
        handles.len(),
        client.service(),
        playlist_id,
        batcher.window_count(handles.len())
    );
    let issued = batcher
        .run("clear", &handles, |_, window| client.remove_items(playlist_id, window))
        .await;
    Ok(issued)
}

/// Append `ids` in order using the client's additive limit. Each window is
/// told its offset so clients that cannot keep request order can pin
/// positions. Returns the number of add requests issued.
pub async fn append_tracks(client: &dyn PlatformClient, playlist_id: &str, ids: &[String]) -> usize {
    let batcher = RateAwareBatcher::new(client.additive_batch_size());
    info!(
        "Adding {} item(s) to {} playlist {} in {} request(s)",
        ids.len(),
        client.service(),
        playlist_id,
        batcher.window_count(ids.len())
    );
    batcher
        .run("append", ids, |offset, window| client.add_items(playlist_id, window, offset))
        .await
}
