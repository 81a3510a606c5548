// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
pub mod cases;
pub mod customers;
pub mod dashboard;
pub mod diavgeia;
pub mod files;
pub mod tasks;

use axum::extract::Json;
use common::Case;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::database;
use crate::error::AppError;

/// Query string for list endpoints with a free-text filter.
#[derive(Deserialize, Debug, Default)]
pub struct ListQuery {
    pub q: Option<String>,
}

/// Handler for the health probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// Loads a case or answers 404 with the given message.
pub(crate) async fn require_case(
    pool: &SqlitePool,
    id: i64,
    message: &str,
) -> Result<Case, AppError> {
    database::get_case_from_db(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found(message))
}

/// Trimmed, non-empty value of an optional field; `None` means the field
/// fails a required-field validation.
pub(crate) fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
