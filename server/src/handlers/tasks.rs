// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use common::{CreateTaskPayload, Task};
use tracing::info;

use super::{required, require_case};
use crate::error::AppError;
use crate::{AppState, database};

/// Handler for listing all tasks, ordered by start time.
pub async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = database::list_tasks_from_db(&state.pool).await?;
    info!("Successfully retrieved {} tasks.", tasks.len());
    Ok(Json(tasks))
}

/// Handler for creating a task, optionally associated with a case.
pub async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskPayload>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let (Some(title), Some(start_iso), Some(end_iso)) = (
        required(&payload.title),
        required(&payload.start_iso),
        required(&payload.end_iso),
    ) else {
        return Err(AppError::validation("title, start_iso, end_iso required"));
    };

    let task = database::create_task_in_db(
        &state.pool,
        &title,
        &start_iso,
        &end_iso,
        payload.notes.as_deref().unwrap_or(""),
        payload.case_id,
    )
    .await?;

    info!("Task created successfully with ID: {}", task.id);
    Ok((StatusCode::CREATED, Json(task)))
}

/// Handler for creating a task directly under a case.
pub async fn create_case_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<CreateTaskPayload>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    require_case(&state.pool, id, "Not found").await?;

    let (Some(title), Some(start_iso), Some(end_iso)) = (
        required(&payload.title),
        required(&payload.start_iso),
        required(&payload.end_iso),
    ) else {
        return Err(AppError::validation("title, start_iso, end_iso required"));
    };

    let task = database::create_task_in_db(
        &state.pool,
        &title,
        &start_iso,
        &end_iso,
        payload.notes.as_deref().unwrap_or(""),
        Some(id),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(task)))
}
