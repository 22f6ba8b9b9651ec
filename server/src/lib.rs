use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use sync_core::{route, schema, ForumEvent, IndexGateway, IndexKind, SyncCoordinator, SyncJob};
use tokio::sync::mpsc::error::TrySendError;
use tower_http::trace::TraceLayer;

pub mod worker;

pub use worker::{JobQueue, WorkerConfig};

type ApiError = (StatusCode, String);

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SyncCoordinator>,
    pub queue: JobQueue,
    pub admin_token: Option<String>,
    /// When false, change notifications are accepted and dropped.
    pub enabled: bool,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/events", post(event_handler))
        .route("/admin/jobs", post(job_handler))
        .route("/admin/schema", post(create_schema))
        .route("/admin/indices/:name", delete(drop_index))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Route a forum change notification to a sync job and queue it. Requires the
/// same `X-ADMIN-TOKEN` as the admin routes.
pub async fn event_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<ForumEvent>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    authorize(&state, &headers)?;
    if !state.enabled {
        tracing::debug!(event = event.name(), "sync disabled, dropping event");
        return Ok((StatusCode::ACCEPTED, Json(json!({ "status": "disabled" }))));
    }
    let job = route(&event);
    tracing::debug!(event = event.name(), ?job, "routed event");
    enqueue(&state, job)
}

/// Queue a job directly, bypassing event routing.
async fn job_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(job): Json<SyncJob>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    authorize(&state, &headers)?;
    enqueue(&state, job)
}

fn enqueue(state: &AppState, job: SyncJob) -> Result<(StatusCode, Json<Value>), ApiError> {
    let body = json!({ "status": "queued", "job": &job });
    match state.queue.enqueue(job) {
        Ok(()) => Ok((StatusCode::ACCEPTED, Json(body))),
        Err(TrySendError::Full(job)) => {
            tracing::warn!(?job, "job queue full");
            Err((StatusCode::SERVICE_UNAVAILABLE, "job queue full".into()))
        }
        Err(TrySendError::Closed(_)) => Err((StatusCode::SERVICE_UNAVAILABLE, "job queue closed".into())),
    }
}

async fn create_schema(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers)?;
    let names = state.coordinator.indices();
    schema::create_all(state.coordinator.gateway().as_ref(), names)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;
    let indices: Vec<String> = IndexKind::ALL.iter().map(|k| names.name(*k)).collect();
    Ok(Json(json!({ "indices": indices })))
}

async fn drop_index(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers)?;
    let dropped = state
        .coordinator
        .gateway()
        .drop_index(&name)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;
    Ok(Json(json!({ "index": name, "dropped": dropped })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
