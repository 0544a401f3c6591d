//! Song -> catalog track matching.
//!
//! For each performed song the catalog is searched with `"{artist} {title}"`
//! and the returned candidates are scanned in the catalog's own order. The
//! first candidate with a listed artist whose similarity to the target artist
//! is strictly above the threshold wins; there is no re-ranking. An accepted
//! track already in the playlist (or accepted earlier in the same run) is a
//! duplicate, and scanning stops there either way.

use crate::api::Catalog;
use crate::models::{ExistingTrackSet, MatchOutcome, MatchResult, SongRequest, TrackCandidate};
use anyhow::Result;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    /// Candidates need an artist scoring strictly above this.
    pub similarity_threshold: f64,
    /// Number of candidates requested per search.
    pub candidate_limit: usize,
    /// Searches allowed in flight at once during reconciliation.
    pub search_concurrency: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            candidate_limit: 10,
            search_concurrency: 1,
        }
    }
}

impl MatchConfig {
    pub fn accepts(&self, score: f64) -> bool {
        score > self.similarity_threshold
    }
}

pub fn build_query(artist: &str, title: &str) -> String {
    format!("{} {}", artist.trim(), title.trim())
}

/// Case-insensitive normalized edit similarity in [0, 1].
pub fn artist_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Best similarity between the target artist and any listed artist, or None
/// for a candidate without artists.
pub fn best_artist_score(target: &str, candidate: &TrackCandidate) -> Option<f64> {
    candidate
        .artist_names
        .iter()
        .map(|name| artist_similarity(target, name))
        .fold(None, |best, s| Some(best.map_or(s, |b: f64| b.max(s))))
}

/// First candidate, in the given order, that the artist filter accepts.
pub fn select_candidate<'a>(
    cfg: &MatchConfig,
    artist: &str,
    candidates: &'a [TrackCandidate],
) -> Option<&'a TrackCandidate> {
    candidates.iter().find(|c| {
        !c.uri.is_empty() && best_artist_score(artist, c).map_or(false, |s| cfg.accepts(s))
    })
}

/// Decide the outcome for one song from its search candidates, updating
/// `existing` when the song is matched.
pub fn decide(
    cfg: &MatchConfig,
    song: &SongRequest,
    artist: &str,
    candidates: &[TrackCandidate],
    existing: &mut ExistingTrackSet,
) -> MatchResult {
    let outcome = match select_candidate(cfg, artist, candidates) {
        None => MatchOutcome::NotFound,
        Some(track) if existing.contains(&track.uri) => MatchOutcome::Duplicate(track.clone()),
        Some(track) => {
            existing.insert(track.uri.clone());
            MatchOutcome::Matched(track.clone())
        }
    };
    debug!(ordinal = song.ordinal, title = %song.title, ?outcome, "song decided");
    MatchResult {
        song: song.clone(),
        outcome,
    }
}

pub async fn search_candidates(
    catalog: &dyn Catalog,
    cfg: &MatchConfig,
    artist: &str,
    title: &str,
) -> Result<Vec<TrackCandidate>> {
    let query = build_query(artist, title);
    catalog.search_tracks(&query, cfg.candidate_limit).await
}

/// Search and decide for a single song. A failed search degrades to NotFound.
pub async fn match_song(
    catalog: &dyn Catalog,
    cfg: &MatchConfig,
    song: &SongRequest,
    artist: &str,
    existing: &mut ExistingTrackSet,
) -> MatchResult {
    match search_candidates(catalog, cfg, artist, &song.title).await {
        Ok(candidates) => decide(cfg, song, artist, &candidates, existing),
        Err(e) => {
            warn!(title = %song.title, error = %e, "search failed; treating song as not found");
            MatchResult::not_found(song)
        }
    }
}
