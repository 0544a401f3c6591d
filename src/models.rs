use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One performed song, in setlist order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRequest {
    pub title: String,
    /// 1-based position across all sets of the show.
    pub ordinal: usize,
}

impl SongRequest {
    pub fn new(title: impl Into<String>, ordinal: usize) -> Self {
        Self {
            title: title.into(),
            ordinal,
        }
    }

    /// Build requests from plain titles, numbering them from 1.
    pub fn from_titles<I, S>(titles: I) -> Vec<SongRequest>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        titles
            .into_iter()
            .enumerate()
            .map(|(i, t)| SongRequest::new(t, i + 1))
            .collect()
    }
}

/// A track returned by a catalog search, not yet confirmed as a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackCandidate {
    pub id: String,
    pub title: String,
    pub artist_names: Vec<String>,
    pub uri: String,
}

/// Track uris already present in the target playlist, plus everything
/// accepted so far in the current run. Never shrinks during a run.
#[derive(Debug, Clone, Default)]
pub struct ExistingTrackSet {
    uris: HashSet<String>,
}

impl ExistingTrackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.uris.contains(uri)
    }

    /// Returns false if the uri was already present.
    pub fn insert(&mut self, uri: impl Into<String>) -> bool {
        self.uris.insert(uri.into())
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ExistingTrackSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            uris: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "track", rename_all = "snake_case")]
pub enum MatchOutcome {
    Matched(TrackCandidate),
    NotFound,
    Duplicate(TrackCandidate),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub song: SongRequest,
    pub outcome: MatchOutcome,
}

impl MatchResult {
    pub fn not_found(song: &SongRequest) -> Self {
        Self {
            song: song.clone(),
            outcome: MatchOutcome::NotFound,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self.outcome, MatchOutcome::Matched(_))
    }

    /// Uri of the selected track for Matched and Duplicate outcomes.
    pub fn uri(&self) -> Option<&str> {
        match &self.outcome {
            MatchOutcome::Matched(t) | MatchOutcome::Duplicate(t) => Some(t.uri.as_str()),
            MatchOutcome::NotFound => None,
        }
    }

    /// Short human-readable line used for progress reporting.
    pub fn describe(&self) -> String {
        match &self.outcome {
            MatchOutcome::Matched(t) => format!(
                "Matched '{}' -> {} by {}",
                self.song.title,
                t.title,
                t.artist_names.join(", ")
            ),
            MatchOutcome::Duplicate(t) => {
                format!("'{}' already in playlist ({})", self.song.title, t.uri)
            }
            MatchOutcome::NotFound => format!("No match for '{}'", self.song.title),
        }
    }
}

/// Result of one reconciliation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub added_count: usize,
    pub results: Vec<MatchResult>,
    /// Batch sent to the catalog, in match order (empty when nothing matched).
    pub appended_uris: Vec<String>,
    /// Set when the single append call failed; `added_count` is then 0.
    pub append_error: Option<String>,
}

impl SyncOutcome {
    pub fn not_found_titles(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.outcome == MatchOutcome::NotFound)
            .map(|r| r.song.title.clone())
            .collect()
    }

    pub fn duplicate_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, MatchOutcome::Duplicate(_)))
            .count()
    }
}

/// Ordered songs of one show plus the performing artist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setlist {
    pub id: String,
    pub artist: String,
    pub songs: Vec<SongRequest>,
    pub event_date: Option<String>,
    pub venue: Option<String>,
}

/// One row of a setlist search, enough to pick a show.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetlistSummary {
    pub id: String,
    pub event_date: String,
    pub venue: String,
    pub city: String,
    pub country: String,
}

/// One page of a playlist listing; `next` is an opaque cursor.
#[derive(Debug, Clone, Default)]
pub struct TrackPage {
    pub uris: Vec<String>,
    pub next: Option<String>,
}
