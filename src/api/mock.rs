use super::Catalog;
use crate::models::{TrackCandidate, TrackPage};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::info;

/// In-memory catalog used in tests and for dry runs.
/// Search answers are scripted per exact query string; playlists are plain
/// vectors served in pages of `page_size`; every append call is recorded.
pub struct MockCatalog {
    searches: Mutex<HashMap<String, Vec<TrackCandidate>>>,
    failing_queries: Mutex<HashSet<String>>,
    playlists: Mutex<HashMap<String, Vec<String>>>,
    append_calls: Mutex<Vec<(String, Vec<String>)>>,
    search_log: Mutex<Vec<String>>,
    page_size: usize,
    fail_listing: bool,
    fail_append: bool,
    next_playlist: Mutex<u32>,
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCatalog {
    pub fn new() -> Self {
        Self {
            searches: Mutex::new(HashMap::new()),
            failing_queries: Mutex::new(HashSet::new()),
            playlists: Mutex::new(HashMap::new()),
            append_calls: Mutex::new(Vec::new()),
            search_log: Mutex::new(Vec::new()),
            page_size: 100,
            fail_listing: false,
            fail_append: false,
            next_playlist: Mutex::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn failing_append(mut self) -> Self {
        self.fail_append = true;
        self
    }

    pub fn with_search(self, query: &str, candidates: Vec<TrackCandidate>) -> Self {
        lock(&self.searches).insert(query.to_string(), candidates);
        self
    }

    pub fn with_failing_search(self, query: &str) -> Self {
        lock(&self.failing_queries).insert(query.to_string());
        self
    }

    pub fn with_playlist(self, playlist_id: &str, uris: Vec<String>) -> Self {
        lock(&self.playlists).insert(playlist_id.to_string(), uris);
        self
    }

    pub fn playlist(&self, playlist_id: &str) -> Option<Vec<String>> {
        lock(&self.playlists).get(playlist_id).cloned()
    }

    pub fn append_calls(&self) -> Vec<(String, Vec<String>)> {
        lock(&self.append_calls).clone()
    }

    pub fn searched_queries(&self) -> Vec<String> {
        lock(&self.search_log).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<TrackCandidate>> {
        lock(&self.search_log).push(query.to_string());
        if lock(&self.failing_queries).contains(query) {
            return Err(anyhow!("mock search failure for {}", query));
        }
        let mut found = lock(&self.searches).get(query).cloned().unwrap_or_default();
        found.truncate(limit);
        Ok(found)
    }

    async fn playlist_tracks_page(&self, playlist_id: &str, cursor: Option<&str>) -> Result<TrackPage> {
        if self.fail_listing {
            return Err(anyhow!("mock listing failure"));
        }
        let offset: usize = match cursor {
            Some(c) => c.parse().map_err(|e| anyhow!("bad cursor {}: {}", c, e))?,
            None => 0,
        };
        let playlists = lock(&self.playlists);
        let all = playlists
            .get(playlist_id)
            .ok_or_else(|| anyhow!("no such playlist {}", playlist_id))?;
        let end = (offset + self.page_size).min(all.len());
        let uris = all.get(offset..end).map(|s| s.to_vec()).unwrap_or_default();
        let next = if end < all.len() { Some(end.to_string()) } else { None };
        Ok(TrackPage { uris, next })
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        info!("MockCatalog: add_tracks {} -> {} tracks", playlist_id, uris.len());
        lock(&self.append_calls).push((playlist_id.to_string(), uris.to_vec()));
        if self.fail_append {
            return Err(anyhow!("mock append failure"));
        }
        lock(&self.playlists)
            .entry(playlist_id.to_string())
            .or_default()
            .extend(uris.iter().cloned());
        Ok(())
    }

    async fn create_playlist(&self, name: &str, _description: &str) -> Result<String> {
        let mut n = lock(&self.next_playlist);
        *n += 1;
        let id = format!("mockplaylist{}", n);
        info!("MockCatalog: create_playlist {} -> {}", name, id);
        lock(&self.playlists).insert(id.clone(), Vec::new());
        Ok(id)
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn is_authenticated(&self) -> bool {
        true
    }
}
