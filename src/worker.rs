use crate::api::spotify::extract_playlist_id;
use crate::api::Catalog;
use crate::error::{SourceError, SyncError};
use crate::matching::MatchConfig;
use crate::models::{Setlist, SyncOutcome};
use crate::reconcile::{reconcile, ProgressObserver};
use crate::setlist::SetlistSource;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

pub const DEFAULT_DESCRIPTION: &str = "Created by setlist-sync";

/// Where matched tracks go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PlaylistTarget {
    /// An existing playlist, as a URL, URI or bare id.
    Existing { reference: String },
    /// A playlist created for this sync. Without a name, "{artist} Setlist".
    New {
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub setlist: String,
    pub target: PlaylistTarget,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub setlist_id: String,
    pub artist: String,
    pub playlist_id: String,
    pub outcome: SyncOutcome,
}

/// Resolve a target to a playlist id, creating the playlist when asked.
/// `default_name` is used for new playlists without an explicit name.
pub async fn resolve_target(
    catalog: &dyn Catalog,
    target: &PlaylistTarget,
    default_name: &str,
) -> Result<String, SyncError> {
    match target {
        PlaylistTarget::Existing { reference } => extract_playlist_id(reference)
            .ok_or_else(|| SyncError::InvalidTarget(format!("not a playlist reference: {}", reference))),
        PlaylistTarget::New { name, description } => {
            let name = name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(default_name);
            let description = description.as_deref().unwrap_or(DEFAULT_DESCRIPTION);
            let id = catalog
                .create_playlist(name, description)
                .await
                .map_err(|e| SyncError::InvalidTarget(format!("creating playlist '{}': {}", name, e)))?;
            info!(playlist = %id, name, "created playlist");
            Ok(id)
        }
    }
}

/// Fetch a setlist and refuse one without songs.
pub async fn fetch_usable_setlist(source: &dyn SetlistSource, reference: &str) -> Result<Setlist, SyncError> {
    let setlist = source.fetch_setlist(reference).await?;
    if setlist.songs.is_empty() {
        return Err(SourceError::NoSongs(reference.to_string()).into());
    }
    Ok(setlist)
}

/// Setlist -> target playlist -> reconciliation. A failed append is turned
/// into a top-level error here; the driver itself only reports it.
pub async fn run_sync(
    catalog: &dyn Catalog,
    source: &dyn SetlistSource,
    cfg: &MatchConfig,
    request: &SyncRequest,
    observer: &dyn ProgressObserver,
) -> Result<SyncReport, SyncError> {
    let setlist = fetch_usable_setlist(source, &request.setlist).await?;
    let playlist_id = resolve_target(catalog, &request.target, &format!("{} Setlist", setlist.artist)).await?;
    sync_into(catalog, cfg, setlist, playlist_id, observer).await
}

async fn sync_into(
    catalog: &dyn Catalog,
    cfg: &MatchConfig,
    setlist: Setlist,
    playlist_id: String,
    observer: &dyn ProgressObserver,
) -> Result<SyncReport, SyncError> {
    info!(
        artist = %setlist.artist,
        songs = setlist.songs.len(),
        playlist = %playlist_id,
        "adding songs from setlist"
    );
    let outcome = reconcile(
        catalog,
        cfg,
        &setlist.songs,
        &setlist.artist,
        &playlist_id,
        observer,
    )
    .await?;
    if let Some(err) = &outcome.append_error {
        return Err(SyncError::CatalogUnavailable(format!("adding tracks failed: {}", err)));
    }
    Ok(SyncReport {
        setlist_id: setlist.id,
        artist: setlist.artist,
        playlist_id,
        outcome,
    })
}

/// Non-empty, non-comment lines of a setlist list file.
pub fn read_setlist_refs(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading setlist file {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub total_added: usize,
    pub reports: Vec<SyncReport>,
    /// (reference, error message) for every setlist that was skipped.
    pub skipped: Vec<(String, String)>,
}

/// Sync several setlists into one already-resolved playlist. Unusable
/// setlists are skipped; catalog failures on one setlist do not stop the rest.
pub async fn run_batch(
    catalog: &dyn Catalog,
    source: &dyn SetlistSource,
    cfg: &MatchConfig,
    references: &[String],
    playlist_id: &str,
    observer: &dyn ProgressObserver,
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for reference in references {
        let synced = match fetch_usable_setlist(source, reference).await {
            Ok(setlist) => sync_into(catalog, cfg, setlist, playlist_id.to_string(), observer).await,
            Err(e) => Err(e),
        };
        match synced {
            Ok(report) => {
                summary.total_added += report.outcome.added_count;
                summary.reports.push(report);
            }
            Err(e) => {
                warn!(setlist = %reference, error = %e, "skipping setlist");
                summary.skipped.push((reference.clone(), e.to_string()));
            }
        }
    }
    summary
}
