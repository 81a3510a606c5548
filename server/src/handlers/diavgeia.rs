// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::{CaseDecisionLink, CreateDecisionLinkPayload, Decision, DiavgeiaStats, LinkedDecision};
use serde::Deserialize;
use tracing::info;

use super::{required, require_case};
use crate::diavgeia::{CacheSearchFilters, clamp_page_size};
use crate::error::AppError;
use crate::registry::RegistryQuery;
use crate::{AppState, database};

/// Query string of `GET /api/diavgeia/search`.
#[derive(Deserialize, Debug, Default)]
pub struct DiavgeiaSearchParams {
    pub q: Option<String>,
    pub ada: Option<String>,
    pub subject: Option<String>,
    pub protocol: Option<String>,
    pub org: Option<String>,
    #[serde(rename = "type")]
    pub decision_type: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<String>,
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Deserialize, Debug, Default)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

/// Handler for decision search.
///
/// Remote mode (refresh requested, or an ADA filter present) forwards the
/// whole filter set to the registry and caches everything it returns;
/// cache mode answers from local rows only.
pub async fn search_decisions(
    State(state): State<AppState>,
    Query(params): Query<DiavgeiaSearchParams>,
) -> Result<Response, AppError> {
    let page = params.page.unwrap_or(0);
    let size = clamp_page_size(params.size.unwrap_or(0));

    let ada = required(&params.ada);
    if params.refresh || ada.is_some() {
        let response = state
            .cache
            .search_remote(&RegistryQuery {
                q: params.q,
                ada,
                subject: params.subject,
                protocol: params.protocol,
                org: params.org,
                decision_type: params.decision_type,
                from_date: params.from_date,
                to_date: params.to_date,
                status: params.status,
                sort: params.sort,
                page,
                size,
            })
            .await?;
        return Ok(Json(response).into_response());
    }

    let local = state
        .cache
        .search_cache(&CacheSearchFilters {
            q: params.q,
            org: params.org,
            decision_type: params.decision_type,
            from_date: params.from_date,
            to_date: params.to_date,
            status: params.status,
            page,
            size,
        })
        .await?;
    Ok(Json(local).into_response())
}

/// Handler for a single decision by ADA, cache-first.
pub async fn get_decision(
    State(state): State<AppState>,
    Path(ada): Path<String>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<Decision>, AppError> {
    let decision = state.cache.get_by_ada(&ada, query.refresh).await?;
    Ok(Json(decision))
}

/// Handler forcing a registry fetch + cache write for one ADA.
pub async fn fetch_decision(
    State(state): State<AppState>,
    Path(ada): Path<String>,
) -> Result<(StatusCode, Json<Decision>), AppError> {
    let decision = state.cache.fetch_and_cache(&ada).await?;
    info!("Fetched and cached decision {}", decision.ada);
    Ok((StatusCode::CREATED, Json(decision)))
}

/// Handler linking a cached decision to a case. The decision must already
/// be in the cache, and a case/decision pair can only be linked once.
pub async fn create_decision_link(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<CreateDecisionLinkPayload>,
) -> Result<(StatusCode, Json<CaseDecisionLink>), AppError> {
    require_case(&state.pool, id, "Case not found").await?;

    let Some(decision_ada) = required(&payload.decision_ada) else {
        return Err(AppError::validation("decision_ada is required"));
    };

    if state.cache.cached(&decision_ada).await?.is_none() {
        return Err(AppError::validation(
            "Decision must be fetched/cached before linking",
        ));
    }

    if database::find_decision_link_in_db(&state.pool, id, &decision_ada)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(
            "This decision is already linked to this case".to_string(),
        ));
    }

    let link = database::create_decision_link_in_db(
        &state.pool,
        id,
        &decision_ada,
        payload.notes.as_deref().unwrap_or(""),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(link)))
}

/// Handler listing a case's decision links together with the cached
/// decisions they reference.
pub async fn list_decision_links(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<LinkedDecision>>, AppError> {
    require_case(&state.pool, id, "Case not found").await?;

    let links = database::list_decision_links_from_db(&state.pool, id).await?;

    let mut linked = Vec::with_capacity(links.len());
    for link in links {
        // The join in the query guarantees the cached row exists.
        let Some(decision) = state.cache.cached(&link.decision_ada).await? else {
            continue;
        };
        linked.push(LinkedDecision {
            id: link.id,
            case_id: link.case_id,
            decision_ada: link.decision_ada,
            notes: link.notes,
            created_at: link.created_at,
            decision,
        });
    }

    Ok(Json(linked))
}

/// Handler removing one decision link from a case.
pub async fn delete_decision_link(
    State(state): State<AppState>,
    Path((id, link_id)): Path<(i64, i64)>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_case(&state.pool, id, "Case not found").await?;

    database::get_decision_link_from_db(&state.pool, link_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Link not found"))?;

    database::delete_decision_link_in_db(&state.pool, link_id).await?;

    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Handler for the cache statistics shown on the dashboard.
pub async fn diavgeia_stats(
    State(state): State<AppState>,
) -> Result<Json<DiavgeiaStats>, AppError> {
    let stats = state.cache.stats().await?;
    Ok(Json(stats))
}
