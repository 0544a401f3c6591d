use crate::error::SourceError;
use crate::models::{SetlistSummary, Setlist, SongRequest};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::env;
use tracing::{debug, info};

static SETLIST_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/setlist/.+/.*-([0-9a-f]+)\.html").expect("setlist url regex"));
static SETLIST_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-f]{4,16}$").expect("setlist id regex"));

/// Extract the setlist id from a setlist.fm page URL, or accept a bare id.
pub fn parse_setlist_reference(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if let Some(c) = SETLIST_URL.captures(reference) {
        return Some(c[1].to_string());
    }
    if SETLIST_ID.is_match(reference) {
        return Some(reference.to_string());
    }
    None
}

/// Anything that can turn a setlist reference into songs plus an artist.
#[async_trait]
pub trait SetlistSource: Send + Sync {
    async fn fetch_setlist(&self, reference: &str) -> Result<Setlist, SourceError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSetlist {
    #[serde(default)]
    id: String,
    #[serde(default)]
    event_date: Option<String>,
    artist: Option<RawArtist>,
    #[serde(default)]
    venue: Option<RawVenue>,
    #[serde(default)]
    sets: Option<RawSets>,
}

#[derive(Debug, Deserialize)]
struct RawArtist {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVenue {
    name: Option<String>,
    city: Option<RawCity>,
}

#[derive(Debug, Deserialize)]
struct RawCity {
    name: Option<String>,
    country: Option<RawCountry>,
}

#[derive(Debug, Deserialize)]
struct RawCountry {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSets {
    #[serde(default)]
    set: Vec<RawSet>,
}

#[derive(Debug, Deserialize)]
struct RawSet {
    #[serde(default)]
    song: Vec<RawSong>,
}

#[derive(Debug, Deserialize)]
struct RawSong {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSearch {
    #[serde(default)]
    setlist: Vec<RawSetlist>,
}

/// Convert a setlist.fm setlist document. Songs with empty names (setlist.fm
/// uses them for unidentified songs) are dropped; ordinals stay contiguous.
pub fn parse_setlist(value: serde_json::Value) -> Result<Setlist, SourceError> {
    let raw: RawSetlist =
        serde_json::from_value(value).map_err(|e| SourceError::Malformed(e.to_string()))?;
    let artist = raw
        .artist
        .and_then(|a| a.name)
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| SourceError::Malformed("missing artist name".into()))?;
    let titles = raw
        .sets
        .map(|s| s.set)
        .unwrap_or_default()
        .into_iter()
        .flat_map(|set| set.song)
        .filter_map(|song| song.name)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    Ok(Setlist {
        id: raw.id,
        artist,
        songs: SongRequest::from_titles(titles),
        event_date: raw.event_date,
        venue: raw.venue.and_then(|v| v.name),
    })
}

fn summarize(raw: RawSetlist) -> SetlistSummary {
    let venue = raw.venue;
    let city = venue.as_ref().and_then(|v| v.city.as_ref());
    SetlistSummary {
        id: raw.id,
        event_date: raw.event_date.unwrap_or_else(|| "Unknown".into()),
        venue: venue
            .as_ref()
            .and_then(|v| v.name.clone())
            .unwrap_or_else(|| "Unknown Venue".into()),
        city: city
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| "Unknown City".into()),
        country: city
            .and_then(|c| c.country.as_ref())
            .and_then(|c| c.name.clone())
            .unwrap_or_default(),
    }
}

/// setlist.fm REST client. The API base may be overridden by
/// SETLISTFM_API_BASE or `with_base` (useful for tests).
pub struct SetlistFmClient {
    client: Client,
    api_key: String,
    base: String,
}

impl SetlistFmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base: env::var("SETLISTFM_API_BASE")
                .unwrap_or_else(|_| "https://api.setlist.fm/rest/1.0".into()),
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("x-api-key", &self.api_key)
            .header(ACCEPT, "application/json")
    }

    /// Search setlists by artist and city, first result page only.
    pub async fn search_setlists(&self, artist: &str, city: &str) -> Result<Vec<SetlistSummary>, SourceError> {
        info!(artist, city, "searching setlists");
        let url = format!("{}/search/setlists", self.base);
        let resp = self
            .get(&url)
            .query(&[("artistName", artist), ("cityName", city), ("p", "1")])
            .send()
            .await?;
        let status = resp.status();
        // setlist.fm answers an empty search with 404
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(SourceError::Unavailable(format!("search failed: {}", status)));
        }
        let raw: RawSearch = resp.json().await?;
        Ok(raw.setlist.into_iter().map(summarize).collect())
    }
}

#[async_trait]
impl SetlistSource for SetlistFmClient {
    async fn fetch_setlist(&self, reference: &str) -> Result<Setlist, SourceError> {
        let id = parse_setlist_reference(reference)
            .ok_or_else(|| SourceError::InvalidReference(reference.to_string()))?;
        info!(setlist = %id, "fetching setlist");
        let url = format!("{}/setlist/{}", self.base, id);
        let resp = self.get(&url).send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(id));
        }
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            return Err(SourceError::Unavailable(format!("{} => {}", status, txt)));
        }
        let value: serde_json::Value = resp.json().await?;
        let setlist = parse_setlist(value)?;
        debug!(setlist = %id, songs = setlist.songs.len(), artist = %setlist.artist, "setlist parsed");
        Ok(setlist)
    }
}
