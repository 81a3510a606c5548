// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use common::{Case, CaseDetails, CasePayload, Customer, SetCaseCustomersPayload};
use tracing::{debug, info};

use super::{ListQuery, required, require_case};
use crate::error::AppError;
use crate::{AppState, database, share};

/// Handler for listing cases, optionally filtered by a substring query.
pub async fn list_cases(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Case>>, AppError> {
    let cases = database::list_cases_from_db(&state.pool, query.q.as_deref()).await?;
    info!("Successfully retrieved {} cases.", cases.len());
    Ok(Json(cases))
}

pub async fn get_case(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Case>, AppError> {
    let case = require_case(&state.pool, id, "Not found").await?;
    Ok(Json(case))
}

/// Handler for creating a new case.
///
/// The storage folder is derived from the case number and client name.
/// When no explicit customer links are supplied, a customer whose name
/// matches the client name exactly is linked automatically.
pub async fn create_case(
    State(state): State<AppState>,
    Json(payload): Json<CasePayload>,
) -> Result<(StatusCode, Json<Case>), AppError> {
    let (Some(case_number), Some(client_name)) =
        (required(&payload.case_number), required(&payload.client_name))
    else {
        return Err(AppError::validation("case_number and client_name required"));
    };

    let folder_name = share::default_case_folder(&case_number, &client_name);
    let storage_folder_path = share::join_share_path(&[&state.share_base_dir, &folder_name]);

    let case = database::create_case_in_db(
        &state.pool,
        &database::CaseRecord {
            case_number: &case_number,
            client_name: &client_name,
            reference_number: payload.reference_number.as_deref().unwrap_or(""),
            case_date: payload.case_date.as_deref().unwrap_or(""),
            notes: payload.notes.as_deref().unwrap_or(""),
            status: payload.status.as_deref().unwrap_or("Open"),
            due_date: payload.due_date.as_deref().unwrap_or(""),
            storage_folder_path: &storage_folder_path,
        },
    )
    .await?;

    match payload.customer_ids.as_deref() {
        Some(ids) if !ids.is_empty() => {
            database::set_case_customers_in_db(&state.pool, case.id, ids).await?;
        }
        _ => {
            if let Some(customer) =
                database::find_customer_by_name(&state.pool, &client_name).await?
            {
                debug!(
                    "Auto-linking case {} to customer {} by client name",
                    case.id, customer.id
                );
                database::set_case_customers_in_db(&state.pool, case.id, &[customer.id]).await?;
            }
        }
    }

    info!("Case created successfully with ID: {}", case.id);
    Ok((StatusCode::CREATED, Json(case)))
}

/// Handler for updating a case. The storage folder path follows any
/// change to the case number or client name; customer links are replaced
/// only when `customer_ids` is present in the payload.
pub async fn update_case(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<CasePayload>,
) -> Result<Json<Case>, AppError> {
    let existing = require_case(&state.pool, id, "Not found").await?;

    let (Some(case_number), Some(client_name)) =
        (required(&payload.case_number), required(&payload.client_name))
    else {
        return Err(AppError::validation("case_number and client_name required"));
    };

    let folder_name = share::default_case_folder(&case_number, &client_name);
    let storage_folder_path = share::join_share_path(&[&state.share_base_dir, &folder_name]);

    let case = database::update_case_in_db(
        &state.pool,
        id,
        &database::CaseRecord {
            case_number: &case_number,
            client_name: &client_name,
            reference_number: payload.reference_number.as_deref().unwrap_or(""),
            case_date: payload.case_date.as_deref().unwrap_or(""),
            notes: payload.notes.as_deref().unwrap_or(""),
            status: payload.status.as_deref().unwrap_or(&existing.status),
            due_date: payload.due_date.as_deref().unwrap_or(&existing.due_date),
            storage_folder_path: &storage_folder_path,
        },
    )
    .await?;

    if let Some(ids) = payload.customer_ids.as_deref() {
        database::set_case_customers_in_db(&state.pool, id, ids).await?;
    }

    Ok(Json(case))
}

/// Handler for the case detail view: the case itself, its resolved
/// customers (explicit links first, name match as fallback) and its
/// tasks.
pub async fn case_details(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CaseDetails>, AppError> {
    let case = require_case(&state.pool, id, "Not found").await?;
    let customers = database::resolve_case_customers(&state.pool, &case).await?;
    let tasks = database::load_case_tasks_from_db(&state.pool, id).await?;

    Ok(Json(CaseDetails {
        case,
        customers,
        tasks,
    }))
}

pub async fn get_case_customers(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Customer>>, AppError> {
    require_case(&state.pool, id, "Not found").await?;
    let customers = database::load_case_customers_from_db(&state.pool, id).await?;
    Ok(Json(customers))
}

/// Handler replacing the customer set linked to a case.
pub async fn set_case_customers(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<SetCaseCustomersPayload>,
) -> Result<Json<Vec<Customer>>, AppError> {
    require_case(&state.pool, id, "Not found").await?;

    let ids = payload.customer_ids.unwrap_or_default();
    database::set_case_customers_in_db(&state.pool, id, &ids).await?;

    let customers = database::load_case_customers_from_db(&state.pool, id).await?;
    Ok(Json(customers))
}
