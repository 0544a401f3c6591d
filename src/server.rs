use crate::api::Catalog;
use crate::jobs::{spawn_sync, JobRegistry, JobStatus};
use crate::matching::MatchConfig;
use crate::setlist::SetlistSource;
use crate::worker::{PlaylistTarget, SyncRequest};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub registry: JobRegistry,
    pub catalog: Arc<dyn Catalog>,
    pub source: Arc<dyn SetlistSource>,
    pub match_config: MatchConfig,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };
        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

/// POST /sync body, mirroring the web form fields.
#[derive(Debug, Deserialize)]
pub struct SyncForm {
    pub setlist_url: Option<String>,
    #[serde(default = "default_mode")]
    pub playlist_mode: String,
    pub new_playlist_name: Option<String>,
    pub existing_playlist_url: Option<String>,
}

fn default_mode() -> String {
    "new".into()
}

#[derive(Debug, Serialize)]
pub struct SyncStarted {
    pub run_id: Uuid,
}

impl SyncForm {
    fn into_request(self) -> Result<SyncRequest, ApiError> {
        let setlist = self
            .setlist_url
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Setlist URL is required.".into()))?;
        let target = match self.playlist_mode.as_str() {
            "new" => PlaylistTarget::New {
                name: self.new_playlist_name,
                description: None,
            },
            "existing" => PlaylistTarget::Existing {
                reference: self
                    .existing_playlist_url
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| ApiError::BadRequest("Invalid existing playlist URL.".into()))?,
            },
            other => {
                return Err(ApiError::BadRequest(format!("unknown playlist_mode '{}'", other)));
            }
        };
        Ok(SyncRequest { setlist, target })
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn start_sync(
    State(state): State<AppState>,
    Json(form): Json<SyncForm>,
) -> Result<(StatusCode, Json<SyncStarted>), ApiError> {
    let request = form.into_request()?;
    let run_id = spawn_sync(
        state.registry.clone(),
        state.catalog.clone(),
        state.source.clone(),
        state.match_config.clone(),
        request,
    );
    tracing::info!(run_id = %run_id, "sync accepted");
    Ok((StatusCode::ACCEPTED, Json(SyncStarted { run_id })))
}

pub async fn sync_status(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<JobStatus>, ApiError> {
    state
        .registry
        .get(&run_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("sync run not found: {}", run_id)))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync", post(start_sync))
        .route("/status/:run_id", get(sync_status))
        .with_state(state)
}

pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(addr, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;
    Ok(())
}
