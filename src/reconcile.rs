use crate::api::Catalog;
use crate::error::SyncError;
use crate::matching::{decide, search_candidates, MatchConfig};
use crate::models::{ExistingTrackSet, MatchOutcome, MatchResult, SongRequest, SyncOutcome};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tracing::{info, warn};

/// Receives `(current, total, message)` after every song. Must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, current: usize, total: usize, message: &str);
}

/// Observer that ignores everything.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _current: usize, _total: usize, _message: &str) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(usize, usize, &str) + Send + Sync,
{
    fn on_progress(&self, current: usize, total: usize, message: &str) {
        self(current, total, message)
    }
}

/// Load every track uri of the target playlist, across all pages.
pub async fn load_existing(catalog: &dyn Catalog, playlist_id: &str) -> Result<ExistingTrackSet, SyncError> {
    let uris = catalog
        .list_playlist_tracks(playlist_id)
        .await
        .map_err(SyncError::catalog)?;
    Ok(uris.into_iter().collect())
}

/// Match every song against the catalog and append the new tracks to the
/// playlist in a single call.
///
/// Searches may overlap up to `cfg.search_concurrency`, but results are
/// consumed in setlist order, so duplicate attribution is the same as a
/// fully sequential run. Only the initial listing fails the whole run; a
/// failed append is reported through `SyncOutcome::append_error`.
pub async fn reconcile(
    catalog: &dyn Catalog,
    cfg: &MatchConfig,
    songs: &[SongRequest],
    artist: &str,
    playlist_id: &str,
    observer: &dyn ProgressObserver,
) -> Result<SyncOutcome, SyncError> {
    let mut existing = load_existing(catalog, playlist_id).await?;
    info!(
        playlist = playlist_id,
        existing = existing.len(),
        songs = songs.len(),
        "starting reconciliation"
    );

    let total = songs.len();
    let mut results: Vec<MatchResult> = Vec::with_capacity(total);
    let mut batch: Vec<String> = Vec::new();

    // Built eagerly: the stream must stay Send so a run can be tokio::spawn'ed.
    let pending: Vec<_> = songs
        .iter()
        .map(|song| {
            async move {
                let found = search_candidates(catalog, cfg, artist, &song.title).await;
                (song, found)
            }
            .boxed()
        })
        .collect();
    let mut searches = stream::iter(pending).buffered(cfg.search_concurrency.max(1));

    while let Some((song, found)) = searches.next().await {
        let result = match found {
            Ok(candidates) => decide(cfg, song, artist, &candidates, &mut existing),
            Err(e) => {
                warn!(title = %song.title, error = %e, "search failed; treating song as not found");
                MatchResult::not_found(song)
            }
        };
        if let MatchOutcome::Matched(track) = &result.outcome {
            batch.push(track.uri.clone());
        }
        observer.on_progress(results.len() + 1, total, &result.describe());
        results.push(result);
    }

    let mut outcome = SyncOutcome {
        added_count: 0,
        results,
        appended_uris: Vec::new(),
        append_error: None,
    };

    if batch.is_empty() {
        info!(playlist = playlist_id, "nothing new to add");
        return Ok(outcome);
    }

    match catalog.add_tracks(playlist_id, &batch).await {
        Ok(()) => {
            outcome.added_count = batch.len();
            info!(playlist = playlist_id, added = batch.len(), "appended tracks");
        }
        Err(e) => {
            warn!(playlist = playlist_id, error = %e, "append failed");
            outcome.append_error = Some(e.to_string());
        }
    }
    outcome.appended_uris = batch;
    Ok(outcome)
}
