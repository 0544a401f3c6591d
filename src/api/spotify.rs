use super::Catalog;
use crate::db;
use crate::models::{TrackCandidate, TrackPage};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;
use std::path::PathBuf;

/// Spotify caps `limit` on /search at 50 and playlist appends at 100 uris.
const MAX_SEARCH_LIMIT: usize = 50;
const MAX_APPEND_BATCH: usize = 100;
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: i64, // epoch seconds
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

static PLAYLIST_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"playlist[/:]([A-Za-z0-9]+)").expect("playlist regex"));
static BARE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("id regex"));

/// Extract a playlist id from an open.spotify.com URL, a `spotify:playlist:`
/// URI, or a bare id.
pub fn extract_playlist_id(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if let Some(c) = PLAYLIST_REF.captures(reference) {
        return Some(c[1].to_string());
    }
    if BARE_ID.is_match(reference) {
        return Some(reference.to_string());
    }
    None
}

/// Spotify catalog backed by the Spotify Web API.
/// Token management reads token JSON from DB and persists refreshed tokens.
/// Endpoints may be overridden by SPOTIFY_AUTH_BASE and SPOTIFY_API_BASE env vars,
/// or per instance with `with_api_base` / `with_auth_base` (useful for tests).
pub struct SpotifyProvider {
    client: Client,
    client_id: String,
    client_secret: String,
    db_path: PathBuf,
    api_base: String,
    auth_base: String,
    max_batch: usize,
    token: tokio::sync::Mutex<Option<StoredToken>>,
    user_id: tokio::sync::Mutex<Option<String>>,
}

impl SpotifyProvider {
    pub fn new(client_id: String, client_secret: String, db_path: PathBuf) -> Self {
        // If either client_id or client_secret is empty, try to load from DB
        let (client_id, client_secret) = if client_id.is_empty() || client_secret.is_empty() {
            match rusqlite::Connection::open(&db_path)
                .ok()
                .and_then(|conn| db::load_credential_with_client(&conn, "spotify").ok().flatten())
            {
                Some((_token_json, db_client_id, db_client_secret)) => (
                    db_client_id.filter(|s| !s.is_empty()).unwrap_or(client_id),
                    db_client_secret.filter(|s| !s.is_empty()).unwrap_or(client_secret),
                ),
                None => (client_id, client_secret),
            }
        } else {
            (client_id, client_secret)
        };
        Self {
            client: Client::new(),
            client_id,
            client_secret,
            db_path,
            api_base: env::var("SPOTIFY_API_BASE")
                .unwrap_or_else(|_| "https://api.spotify.com/v1".into()),
            auth_base: env::var("SPOTIFY_AUTH_BASE")
                .unwrap_or_else(|_| "https://accounts.spotify.com".into()),
            max_batch: MAX_APPEND_BATCH,
            token: tokio::sync::Mutex::new(None),
            user_id: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_auth_base(mut self, base: impl Into<String>) -> Self {
        self.auth_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Largest number of uris sent per append request (1..=100).
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.clamp(1, MAX_APPEND_BATCH);
        self
    }

    async fn load_token_from_db(&self) -> Result<Option<StoredToken>> {
        let db_path = self.db_path.clone();
        let json_opt =
            tokio::task::spawn_blocking(move || -> Result<Option<String>, anyhow::Error> {
                let conn = rusqlite::Connection::open(db_path)?;
                Ok(db::load_credential_with_client(&conn, "spotify")?.map(|(json, _, _)| json))
            })
            .await??;

        match json_opt {
            Some(s) => {
                let st: StoredToken =
                    serde_json::from_str(&s).map_err(|e| anyhow!("parse token json: {}", e))?;
                Ok(Some(st))
            }
            None => Ok(None),
        }
    }

    async fn persist_token_to_db(&self, st: &StoredToken) -> Result<()> {
        let db_path = self.db_path.clone();
        let s = serde_json::to_string(&st)?;
        tokio::task::spawn_blocking(move || -> Result<(), anyhow::Error> {
            let conn = rusqlite::Connection::open(db_path)?;
            db::save_token_json(&conn, "spotify", &s)?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    async fn ensure_token(&self) -> Result<()> {
        let mut lock = self.token.lock().await;
        if lock.is_none() {
            if let Some(st) = self.load_token_from_db().await? {
                *lock = Some(st);
            }
        }
        if let Some(st) = &*lock {
            let now = Utc::now().timestamp();
            if now + 30 >= st.expires_at {
                debug!("Spotify token is near expiry, refreshing");
                let mut cur = st.clone();
                self.refresh_token_internal(&mut cur).await?;
                *lock = Some(cur);
            }
        }
        Ok(())
    }

    /// Mark the cached token as expired so the next `ensure_token` refreshes it.
    async fn invalidate_token(&self) {
        if let Some(st) = self.token.lock().await.as_mut() {
            st.expires_at = 0;
        }
    }

    async fn refresh_token_internal(&self, cur: &mut StoredToken) -> Result<()> {
        let refresh_token = cur
            .refresh_token
            .clone()
            .ok_or_else(|| anyhow!("no refresh token"))?;
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ];
        let auth_header = format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret))
        );
        let url = format!("{}/api/token", self.auth_base);
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, auth_header)
            .form(&params)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to refresh token: {} - {}", status, body));
        }
        let j: serde_json::Value = resp.json().await?;
        let access_token = j["access_token"]
            .as_str()
            .ok_or_else(|| anyhow!("no access_token"))?
            .to_string();
        let expires_in = j["expires_in"].as_i64().unwrap_or(3600);
        cur.access_token = access_token;
        cur.token_type = "Bearer".into();
        cur.expires_at = Utc::now().timestamp() + expires_in;
        if let Some(s) = j["scope"].as_str() {
            cur.scope = Some(s.to_string());
        }
        // Spotify may rotate the refresh token.
        if let Some(rt) = j["refresh_token"].as_str() {
            cur.refresh_token = Some(rt.to_string());
        }
        self.persist_token_to_db(cur).await?;
        Ok(())
    }

    pub async fn get_bearer(&self) -> Result<String> {
        self.ensure_token().await?;
        let lock = self.token.lock().await;
        let st = lock.as_ref().ok_or_else(|| anyhow!("no token loaded"))?;
        Ok(format!("Bearer {}", st.access_token))
    }

    /// Send an authorized request. A 401 triggers one token refresh and a
    /// retry; a 429 waits for Retry-After, a bounded number of times.
    async fn send_authorized<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let mut refreshed = false;
        let mut rate_limited: u32 = 0;
        loop {
            let bearer = self.get_bearer().await?;
            let resp = build(&bearer).send().await?;
            let status = resp.status();

            if status == StatusCode::UNAUTHORIZED && !refreshed {
                warn!("Got 401 from Spotify; attempting token refresh");
                refreshed = true;
                self.invalidate_token().await;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS && rate_limited < MAX_RATE_LIMIT_RETRIES {
                rate_limited += 1;
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(2);
                warn!("Spotify rate limited; retrying in {}s", retry_after + 1);
                tokio::time::sleep(std::time::Duration::from_secs(retry_after + 1)).await;
                continue;
            }

            return Ok(resp);
        }
    }

    async fn get_user_id(&self) -> Result<String> {
        {
            let g = self.user_id.lock().await;
            if let Some(u) = g.as_ref() {
                return Ok(u.clone());
            }
        }
        let url = format!("{}/me", self.api_base);
        let resp = self
            .send_authorized(|bearer| self.client.get(&url).header(AUTHORIZATION, bearer))
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("failed to fetch /me: {}", resp.status()));
        }
        let j: serde_json::Value = resp.json().await?;
        let id = j["id"]
            .as_str()
            .ok_or_else(|| anyhow!("no id"))?
            .to_string();
        let mut g = self.user_id.lock().await;
        *g = Some(id.clone());
        Ok(id)
    }

    fn first_page_url(&self, playlist_id: &str) -> String {
        format!(
            "{}/playlists/{}/tracks?fields=items(track(uri)),next&offset=0&limit=100",
            self.api_base,
            urlencoding::encode(playlist_id)
        )
    }
}

/// Turn one element of `tracks.items` into a candidate. Items without an id
/// or uri are unusable and skipped.
fn parse_candidate(item: &serde_json::Value) -> Option<TrackCandidate> {
    let id = item["id"].as_str().filter(|s| !s.is_empty())?;
    let uri = item["uri"].as_str().filter(|s| !s.is_empty())?;
    let artist_names = item["artists"]
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|ar| ar["name"].as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();
    Some(TrackCandidate {
        id: id.to_string(),
        title: item["name"].as_str().unwrap_or("").to_string(),
        artist_names,
        uri: uri.to_string(),
    })
}

#[async_trait]
impl Catalog for SpotifyProvider {
    fn name(&self) -> &str {
        "spotify"
    }

    fn is_authenticated(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<TrackCandidate>> {
        let url = format!(
            "{}/search?q={}&type=track&limit={}",
            self.api_base,
            urlencoding::encode(query),
            limit.clamp(1, MAX_SEARCH_LIMIT)
        );
        let resp = self
            .send_authorized(|bearer| {
                self.client
                    .get(&url)
                    .header(AUTHORIZATION, bearer)
                    .header(ACCEPT, "application/json")
            })
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(anyhow!("search failed: {} => {}", status, txt));
        }
        let j: serde_json::Value = resp.json().await?;
        let items = j["tracks"]["items"]
            .as_array()
            .ok_or_else(|| anyhow!("search response has no tracks.items"))?;
        let candidates: Vec<TrackCandidate> = items.iter().filter_map(parse_candidate).collect();
        if candidates.len() < items.len() {
            debug!(
                "search '{}': skipped {} malformed item(s)",
                query,
                items.len() - candidates.len()
            );
        }
        Ok(candidates)
    }

    async fn playlist_tracks_page(&self, playlist_id: &str, cursor: Option<&str>) -> Result<TrackPage> {
        let url = match cursor {
            Some(next) => next.to_string(),
            None => self.first_page_url(playlist_id),
        };
        let resp = self
            .send_authorized(|bearer| self.client.get(&url).header(AUTHORIZATION, bearer))
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(anyhow!("list playlist tracks failed: {} => {}", status, txt));
        }
        let j: serde_json::Value = resp.json().await?;
        let mut uris = Vec::new();
        if let Some(items) = j["items"].as_array() {
            for it in items {
                // track is null for removed or unavailable entries
                if let Some(uri) = it["track"]["uri"].as_str() {
                    uris.push(uri.to_string());
                }
            }
        }
        let next = j["next"].as_str().map(|s| s.to_string());
        Ok(TrackPage { uris, next })
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        let url = format!("{}/playlists/{}/tracks", self.api_base, urlencoding::encode(playlist_id));
        let mut committed = 0;
        for chunk in uris.chunks(self.max_batch) {
            let body = json!({ "uris": chunk });
            let resp = self
                .send_authorized(|bearer| {
                    self.client
                        .post(&url)
                        .header(AUTHORIZATION, bearer)
                        .header(CONTENT_TYPE, "application/json")
                        .json(&body)
                })
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let txt = resp.text().await.unwrap_or_default();
                return Err(anyhow!(
                    "add tracks failed: {} => {} ({} of {} tracks were already added)",
                    status,
                    txt,
                    committed,
                    uris.len()
                ));
            }
            committed += chunk.len();
        }
        Ok(())
    }

    async fn create_playlist(&self, name: &str, description: &str) -> Result<String> {
        let user_id = self.get_user_id().await?;
        let url = format!(
            "{}/users/{}/playlists",
            self.api_base,
            url::form_urlencoded::byte_serialize(user_id.as_bytes()).collect::<String>()
        );
        let body = json!({
            "name": name,
            "description": description,
            "public": false
        });
        let resp = self
            .send_authorized(|bearer| {
                self.client
                    .post(&url)
                    .header(AUTHORIZATION, bearer)
                    .header(CONTENT_TYPE, "application/json")
                    .json(&body)
            })
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(anyhow!("create playlist failed: {} => {}", status, txt));
        }
        let j: serde_json::Value = resp.json().await?;
        let id = j["id"]
            .as_str()
            .ok_or_else(|| anyhow!("no id"))?
            .to_string();
        Ok(id)
    }
}
