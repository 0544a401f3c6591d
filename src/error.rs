use thiserror::Error;

/// Failures of the setlist source. All of them abort a sync before any
/// matching starts.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("not a setlist.fm setlist reference: {0}")]
    InvalidReference(String),

    #[error("setlist not found: {0}")]
    NotFound(String),

    #[error("malformed setlist response: {0}")]
    Malformed(String),

    #[error("setlist {0} has no songs")]
    NoSongs(String),

    #[error("setlist.fm unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Malformed(err.to_string())
        } else {
            SourceError::Unavailable(err.to_string())
        }
    }
}

/// Top-level failure of a sync run. Per-song problems never show up here;
/// they degrade to `MatchOutcome::NotFound`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("invalid target playlist: {0}")]
    InvalidTarget(String),
}

impl SyncError {
    pub fn catalog(err: impl std::fmt::Display) -> Self {
        SyncError::CatalogUnavailable(err.to_string())
    }
}
