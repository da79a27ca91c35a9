use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Router, http::StatusCode};
use futures::Stream;
use futures::stream;
use tokio::sync::{OwnedMutexGuard, mpsc};
use tracing::info;

use crate::db::{repository, sync_state};
use crate::error::AppError;
use crate::models::{AssignedTask, Project, SyncState};
use crate::services::SyncStats;
use crate::services::sync_service::PROGRESS_BUFFER;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync", post(sync_now))
        .route("/sync/stream", get(sync_stream))
        .route("/sync/state", get(list_sync_state))
        .route("/projects", get(list_projects))
        .route("/assignees/{id}/tasks", get(list_assigned_tasks))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

fn claim_sync(state: &AppState) -> Result<OwnedMutexGuard<()>, AppError> {
    state
        .sync_lock
        .clone()
        .try_lock_owned()
        .map_err(|_| AppError::Conflict("a sync pass is already running".to_string()))
}

async fn sync_now(State(state): State<AppState>) -> Result<Json<SyncStats>, AppError> {
    let _guard = claim_sync(&state)?;
    let stats = state.sync_service().sync_all().await?;
    Ok(Json(stats))
}

/// One sync pass streamed as server-sent events, one event per progress line. A client
/// that disconnects cancels the pass at its next progress line.
async fn sync_stream(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let guard = claim_sync(&state)?;
    let service = state.sync_service();
    let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);

    tokio::spawn(async move {
        let _guard = guard;
        service.report(tx).await;
    });
    info!("Streaming sync started");

    let events = stream::unfold(rx, |mut rx| async move {
        let progress = rx.recv().await?;
        let event = Event::default().data(progress.to_string());
        Some((Ok::<_, Infallible>(event), rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn list_sync_state(State(state): State<AppState>) -> Result<Json<Vec<SyncState>>, AppError> {
    let states = sync_state::list_sync_state(&state.db).await?;
    Ok(Json(states))
}

async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<Project>>, AppError> {
    let projects = repository::fetch_projects(&state.db).await?;
    Ok(Json(projects))
}

async fn list_assigned_tasks(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<AssignedTask>>, AppError> {
    let tasks = repository::fetch_assigned_tasks(&state.db, id).await?;
    Ok(Json(tasks))
}
