//! Background sync runs and their pollable status.
//!
//! Each run owns one `JobStatus` record in the registry. The run is the only
//! writer; every update swaps in a complete new record under the write lock,
//! so pollers always read a consistent snapshot.

use crate::api::Catalog;
use crate::matching::MatchConfig;
use crate::reconcile::ProgressObserver;
use crate::setlist::SetlistSource;
use crate::worker::{run_sync, SyncRequest};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub run_id: Uuid,
    pub state: JobState,
    pub current: usize,
    pub total: usize,
    pub message: String,
    pub playlist_id: Option<String>,
    pub added_count: Option<usize>,
    pub not_found: Vec<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    fn queued(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            state: JobState::Queued,
            current: 0,
            total: 0,
            message: "Queued".into(),
            playlist_id: None,
            added_count: None,
            not_found: Vec::new(),
            error: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, JobState::Completed | JobState::Failed)
    }
}

/// Finished runs kept for polling before the oldest are dropped.
pub const DEFAULT_FINISHED_RETENTION: usize = 100;

#[derive(Debug, Clone)]
pub struct JobRegistry {
    inner: Arc<RwLock<HashMap<Uuid, JobStatus>>>,
    max_finished: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            max_finished: DEFAULT_FINISHED_RETENTION,
        }
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_finished` completed or failed runs. Queued and
    /// running entries are never evicted.
    pub fn with_retention(max_finished: usize) -> Self {
        Self {
            max_finished,
            ..Self::default()
        }
    }

    /// Register a new queued run and return its id, evicting the oldest
    /// finished runs beyond the retention limit.
    pub fn create(&self) -> Uuid {
        let run_id = Uuid::new_v4();
        let mut map = self.write();
        Self::evict_finished(&mut map, self.max_finished);
        map.insert(run_id, JobStatus::queued(run_id));
        run_id
    }

    fn evict_finished(map: &mut HashMap<Uuid, JobStatus>, keep: usize) {
        let mut finished: Vec<(DateTime<Utc>, Uuid)> = map
            .values()
            .filter(|s| s.is_finished())
            .map(|s| (s.updated_at, s.run_id))
            .collect();
        if finished.len() <= keep {
            return;
        }
        finished.sort();
        let excess = finished.len() - keep;
        for (_, id) in finished.into_iter().take(excess) {
            map.remove(&id);
        }
        tracing::debug!(evicted = excess, "dropped finished sync runs");
    }

    pub fn get(&self, run_id: &Uuid) -> Option<JobStatus> {
        self.inner
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(run_id)
            .cloned()
    }

    /// Build the next record from the current one and store it whole.
    pub fn replace<F>(&self, run_id: &Uuid, update: F)
    where
        F: FnOnce(&JobStatus) -> JobStatus,
    {
        let mut map = self.write();
        if let Some(current) = map.get(run_id) {
            let mut next = update(current);
            next.updated_at = Utc::now();
            map.insert(*run_id, next);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, JobStatus>> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }
}

/// Progress observer that records into a registry entry.
pub struct JobProgress {
    registry: JobRegistry,
    run_id: Uuid,
}

impl JobProgress {
    pub fn new(registry: JobRegistry, run_id: Uuid) -> Self {
        Self { registry, run_id }
    }
}

impl ProgressObserver for JobProgress {
    fn on_progress(&self, current: usize, total: usize, message: &str) {
        self.registry.replace(&self.run_id, |s| JobStatus {
            state: JobState::Running,
            current,
            total,
            message: message.to_string(),
            ..s.clone()
        });
    }
}

/// Start a sync on the tokio runtime and return the run id to poll.
pub fn spawn_sync(
    registry: JobRegistry,
    catalog: Arc<dyn Catalog>,
    source: Arc<dyn SetlistSource>,
    cfg: MatchConfig,
    request: SyncRequest,
) -> Uuid {
    let run_id = registry.create();
    tokio::spawn(async move {
        tracing::info!(run_id = %run_id, setlist = %request.setlist, "background sync started");
        registry.replace(&run_id, |s| JobStatus {
            state: JobState::Running,
            message: "Fetching setlist".into(),
            ..s.clone()
        });
        let progress = JobProgress::new(registry.clone(), run_id);
        match run_sync(catalog.as_ref(), source.as_ref(), &cfg, &request, &progress).await {
            Ok(report) => {
                let added = report.outcome.added_count;
                tracing::info!(run_id = %run_id, added, "background sync completed");
                registry.replace(&run_id, |s| JobStatus {
                    state: JobState::Completed,
                    message: format!("Successfully added {} songs to your playlist!", added),
                    playlist_id: Some(report.playlist_id.clone()),
                    added_count: Some(added),
                    not_found: report.outcome.not_found_titles(),
                    ..s.clone()
                });
            }
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "background sync failed");
                registry.replace(&run_id, |s| JobStatus {
                    state: JobState::Failed,
                    message: format!("Error: {}", e),
                    error: Some(e.to_string()),
                    ..s.clone()
                });
            }
        }
    });
    run_id
}
