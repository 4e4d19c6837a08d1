use std::sync::Arc;

use anyhow::Context;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use saleslog_shared::{NoteArgs, StatusArgs, TaskCreate, TaskDto, TaskPatch};
use tracing::{error, info, instrument, warn};

use crate::error::{
    FETCH_FAILED, HttpError, NOTE_FAILED, SAVE_FAILED, STATUS_FAILED, UPDATE_FAILED,
};
use crate::state::AppState;

type Shared = State<Arc<AppState>>;

#[instrument(skip(state))]
pub async fn list_tasks(State(state): Shared) -> Result<Json<Vec<TaskDto>>, HttpError> {
    info!("list_tasks invoked");
    match on_blocking_pool(state, |state| state.list()).await {
        Ok(tasks) => Ok(Json(tasks)),
        Err(err) => {
            error!(error = %err, "list_tasks failed");
            Err(HttpError::BadRequest(FETCH_FAILED))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn create_task(
    State(state): Shared,
    payload: Result<Json<TaskCreate>, JsonRejection>,
) -> Result<Json<TaskDto>, HttpError> {
    let Json(create) = body_or(payload, SAVE_FAILED)?;
    info!(
        entity_len = create.entity_name.len(),
        task_type = %create.task_type,
        has_note = create.note.is_some(),
        "create_task invoked"
    );
    match on_blocking_pool(state, move |state| state.create(create)).await {
        Ok(task) => Ok(Json(task)),
        Err(err) => {
            error!(error = %err, "create_task failed");
            Err(HttpError::BadRequest(SAVE_FAILED))
        }
    }
}

#[instrument(skip(state, payload))]
pub async fn update_task(
    State(state): Shared,
    Path(id): Path<String>,
    payload: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<TaskDto>, HttpError> {
    let Json(patch) = body_or(payload, UPDATE_FAILED)?;
    info!(id = %id, "update_task invoked");
    let result = on_blocking_pool(state, {
        let id = id.clone();
        move |state| state.update(&id, patch)
    })
    .await;
    found_or(result, &id, UPDATE_FAILED)
}

#[instrument(skip(state, payload))]
pub async fn set_task_note(
    State(state): Shared,
    Path(id): Path<String>,
    payload: Result<Json<NoteArgs>, JsonRejection>,
) -> Result<Json<TaskDto>, HttpError> {
    let Json(args) = body_or(payload, NOTE_FAILED)?;
    info!(id = %id, note_len = args.note.len(), "set_task_note invoked");
    let result = on_blocking_pool(state, {
        let id = id.clone();
        move |state| state.set_note(&id, args.note)
    })
    .await;
    found_or(result, &id, NOTE_FAILED)
}

#[instrument(skip(state, payload))]
pub async fn set_task_status(
    State(state): Shared,
    Path(id): Path<String>,
    payload: Result<Json<StatusArgs>, JsonRejection>,
) -> Result<Json<TaskDto>, HttpError> {
    let Json(args) = body_or(payload, STATUS_FAILED)?;
    info!(id = %id, status = %args.status, "set_task_status invoked");
    let status = args.status;
    let result = on_blocking_pool(state, {
        let id = id.clone();
        move |state| state.set_status(&id, status)
    })
    .await;
    found_or(result, &id, STATUS_FAILED)
}

/// Datastore calls read and rewrite the document file, so they run on the
/// blocking pool instead of a runtime worker.
async fn on_blocking_pool<T, F>(state: Arc<AppState>, work: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .context("datastore task did not complete")?
}

fn body_or<T>(
    payload: Result<Json<T>, JsonRejection>,
    message: &'static str,
) -> Result<Json<T>, HttpError> {
    payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "rejected request body");
        HttpError::BadRequest(message)
    })
}

fn found_or(
    result: anyhow::Result<Option<TaskDto>>,
    id: &str,
    message: &'static str,
) -> Result<Json<TaskDto>, HttpError> {
    match result {
        Ok(Some(task)) => Ok(Json(task)),
        Ok(None) => {
            warn!(id, "task not found");
            Err(HttpError::NotFound)
        }
        Err(err) => {
            error!(id, error = %err, message, "task write failed");
            Err(HttpError::BadRequest(message))
        }
    }
}
