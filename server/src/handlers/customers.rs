// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use common::{CreateCustomerPayload, Customer, CustomerDetails, UpdateCustomerPayload};
use tracing::info;

use super::{ListQuery, required};
use crate::error::AppError;
use crate::{AppState, database};

/// Handler for listing customers, optionally filtered by a substring
/// query over code, name, contact person and email.
pub async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Customer>>, AppError> {
    let customers = database::list_customers_from_db(&state.pool, query.q.as_deref()).await?;
    info!("Successfully retrieved {} customers.", customers.len());
    Ok(Json(customers))
}

/// Handler for creating a customer. When no code is supplied, the next
/// unused integer code is assigned.
pub async fn create_customer(
    State(state): State<AppState>,
    Json(payload): Json<CreateCustomerPayload>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    let Some(name) = required(&payload.name) else {
        return Err(AppError::validation("name required"));
    };

    let customer_code = match required(&payload.customer_code) {
        Some(code) => code,
        None => database::next_customer_code_from_db(&state.pool).await?,
    };

    let customer =
        database::create_customer_in_db(&state.pool, &customer_code, &name, &payload).await?;

    info!("Customer created successfully with ID: {}", customer.id);
    Ok((StatusCode::CREATED, Json(customer)))
}

/// Handler for updating a customer; both the code and the name are
/// required on update.
pub async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCustomerPayload>,
) -> Result<Json<Customer>, AppError> {
    database::get_customer_from_db(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Not found"))?;

    let (Some(customer_code), Some(name)) =
        (required(&payload.customer_code), required(&payload.name))
    else {
        return Err(AppError::validation("customer_code and name required"));
    };

    let customer =
        database::update_customer_in_db(&state.pool, id, &customer_code, &name, &payload).await?;

    Ok(Json(customer))
}

/// Handler for the customer detail view: the customer and their cases,
/// resolved through explicit links with an exact-name fallback.
pub async fn customer_details(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CustomerDetails>, AppError> {
    let customer = database::get_customer_from_db(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Not found"))?;

    let cases = database::resolve_customer_cases(&state.pool, &customer).await?;

    Ok(Json(CustomerDetails { customer, cases }))
}
