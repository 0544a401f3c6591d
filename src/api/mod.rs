pub mod mock;
pub mod spotify;
pub mod spotify_auth;

use crate::models::{TrackCandidate, TrackPage};
use anyhow::Result;

/// Catalog trait: the operations the matching engine and reconciliation
/// driver need from a music service.
/// Implementations: spotify::SpotifyProvider, mock::MockCatalog.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// Free-text track search. Candidates come back in the catalog's own
    /// relevance order, at most `limit` of them.
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<TrackCandidate>>;

    /// Fetch one page of a playlist's track uris. `cursor` is None for the
    /// first page and otherwise the `next` value of the previous page.
    async fn playlist_tracks_page(&self, playlist_id: &str, cursor: Option<&str>) -> Result<TrackPage>;

    /// Append tracks (URIs) to a playlist, keeping their order.
    /// Implementations that split the append into several requests cannot
    /// roll back: on error, earlier requests stay applied and the error
    /// message says how many tracks went in.
    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()>;

    /// Create a playlist owned by the current user and return its id.
    async fn create_playlist(&self, name: &str, description: &str) -> Result<String>;

    /// List every track uri of a playlist, following `next` until exhausted.
    async fn list_playlist_tracks(&self, playlist_id: &str) -> Result<Vec<String>> {
        let mut uris = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.playlist_tracks_page(playlist_id, cursor.as_deref()).await?;
            uris.extend(page.uris);
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(uris)
    }

    /// Return the catalog's name (for logging, UI, etc)
    fn name(&self) -> &str;

    /// Return true if the catalog has credentials to work with
    fn is_authenticated(&self) -> bool;
}
