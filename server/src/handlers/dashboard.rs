// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::extract::{Json, State};
use common::DashboardMetrics;
use tracing::debug;

use crate::error::AppError;
use crate::share::SharePath;
use crate::{AppState, database};

/// Handler for the dashboard counters. The completed-cases figure comes
/// from the share's completed-cases folder; when that folder (or the
/// share itself) is unavailable the count is simply 0.
pub async fn dashboard_metrics(
    State(state): State<AppState>,
) -> Result<Json<DashboardMetrics>, AppError> {
    let total_customers = database::count_customers_in_db(&state.pool).await?;
    let active_cases = database::count_active_cases_in_db(&state.pool).await?;

    let completed_cases = match count_completed_folders(&state).await {
        Ok(count) => count,
        Err(e) => {
            debug!("Completed-cases folder not countable: {}", e);
            0
        }
    };

    Ok(Json(DashboardMetrics {
        total_customers,
        active_cases,
        completed_cases,
    }))
}

async fn count_completed_folders(state: &AppState) -> Result<i64, AppError> {
    let folder = SharePath::new(&state.share_completed_dir)?;
    let mut session = state.share.connect().await?;
    let entries = session.list(&folder).await?;
    Ok(entries.len() as i64)
}
