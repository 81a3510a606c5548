// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    extract::{Json, Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use super::require_case;
use crate::error::AppError;
use crate::share::{SharePath, sanitize_name};
use crate::AppState;

// Every handler here follows the same shape: resolve the case, validate
// the stored folder path (the traversal guard runs before any share
// call), then open a share session that is released on every exit path
// when it drops.

/// Handler creating the case's folder on the share, parents included.
pub async fn ensure_case_folder(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let case = require_case(&state.pool, id, "Not found").await?;
    let folder = SharePath::new(&case.storage_folder_path)?;

    let mut session = state.share.connect().await?;
    session.ensure_dir(&folder).await?;

    info!("Ensured share folder {}", folder.as_str());
    Ok(Json(
        serde_json::json!({ "ok": true, "folder": folder.as_str() }),
    ))
}

/// Handler listing the files in the case's folder.
pub async fn list_case_files(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let case = require_case(&state.pool, id, "Not found").await?;
    let folder = SharePath::new(&case.storage_folder_path)?;

    let mut session = state.share.connect().await?;
    let names = session.list(&folder).await?;

    let items: Vec<serde_json::Value> = names
        .into_iter()
        .map(|name| serde_json::json!({ "name": name }))
        .collect();

    Ok(Json(
        serde_json::json!({ "folder": folder.as_str(), "items": items }),
    ))
}

/// Handler storing one uploaded file (multipart field `file`) in the
/// case's folder under its sanitized original name.
pub async fn upload_case_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let case = require_case(&state.pool, id, "Not found").await?;
    let folder = SharePath::new(&case.storage_folder_path)?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(e.to_string()))?
    {
        if field.name() == Some("file") {
            let original_name = field.file_name().unwrap_or("").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::validation(e.to_string()))?;
            upload = Some((original_name, data.to_vec()));
        }
    }

    let Some((original_name, data)) = upload else {
        return Err(AppError::validation("No file uploaded"));
    };

    let mut file_name = sanitize_name(&original_name);
    if file_name.is_empty() {
        file_name = "upload.bin".to_string();
    }
    let target = folder.join(&file_name)?;

    let mut session = state.share.connect().await?;
    session.put(&target, data).await?;

    info!("Stored {} on the share", target.as_str());
    Ok(Json(serde_json::json!({ "ok": true, "savedAs": file_name })))
}

#[derive(Deserialize, Debug, Default)]
pub struct DownloadQuery {
    pub name: Option<String>,
}

/// Handler streaming a file back as an attachment.
pub async fn download_case_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let case = require_case(&state.pool, id, "Not found").await?;

    let Some(name) = query.name.filter(|n| !n.trim().is_empty()) else {
        return Err(AppError::validation("Missing name"));
    };

    let folder = SharePath::new(&case.storage_folder_path)?;
    let file_name = sanitize_name(&name);
    let target = folder.join(&file_name)?;

    let mut session = state.share.connect().await?;
    let data = session.get(&target).await?;

    let disposition = format!("attachment; filename=\"{file_name}\"");
    Ok(([(header::CONTENT_DISPOSITION, disposition)], data).into_response())
}
