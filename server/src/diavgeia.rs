// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Read-through cache over the Diavgeia decision registry.
//!
//! Staleness is caller-controlled through the `refresh` flag rather than
//! time-based expiry: the registry has no push mechanism and published
//! decisions rarely change. There is no eviction; the cache grows with
//! use, which is acceptable for a low-volume office tool.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use common::{CachedDecisionPage, Decision, DiavgeiaStats, SearchInfo};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, error, warn};

use crate::error::AppError;
use crate::registry::{DecisionRecord, DecisionRegistry, RegistryQuery, RegistrySearchResponse};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Filter set applied as a conjunction by cache-mode searches.
#[derive(Debug, Clone, Default)]
pub struct CacheSearchFilters {
    /// Substring match over subject, ADA and protocol number.
    pub q: Option<String>,
    /// Substring match over the organization identifier.
    pub org: Option<String>,
    /// Exact decision-type match.
    pub decision_type: Option<String>,
    /// Inclusive issue-date bounds.
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    /// Exact status match.
    pub status: Option<String>,

    pub page: u32,
    pub size: u32,
}

/// Mediates between local callers and the remote registry: serves cached
/// rows, falls back to (or is forced onto) the registry, and keeps the
/// local table in sync with whatever the registry returns. Owns the only
/// write path into `diavgeia_decisions`.
#[derive(Clone)]
pub struct DecisionCache {
    pool: SqlitePool,
    registry: Arc<dyn DecisionRegistry>,
}

impl DecisionCache {
    pub fn new(pool: SqlitePool, registry: Arc<dyn DecisionRegistry>) -> Self {
        Self { pool, registry }
    }

    /// The cached row for an ADA, if any. Never touches the registry.
    pub async fn cached(&self, ada: &str) -> Result<Option<Decision>> {
        let decision =
            sqlx::query_as::<_, Decision>("SELECT * FROM diavgeia_decisions WHERE ada = ?")
                .bind(ada)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to read decision from cache")?;

        Ok(decision)
    }

    /// Read-through lookup. A cache hit without `refresh` returns the row
    /// unmodified; otherwise the registry is asked, the result cached,
    /// and the freshly stored row returned. A remote 404 surfaces as
    /// `NotFound` even when a stale row exists, since the registry is
    /// authoritative.
    pub async fn get_by_ada(&self, ada: &str, refresh: bool) -> Result<Decision, AppError> {
        if !refresh {
            if let Some(found) = self.cached(ada).await? {
                debug!("Cache hit for decision {}", ada);
                return Ok(found);
            }
        }

        self.fetch_and_cache(ada).await
    }

    /// Unconditional registry fetch + upsert, returning the stored row.
    pub async fn fetch_and_cache(&self, ada: &str) -> Result<Decision, AppError> {
        let record = self.registry.get(ada).await?;
        self.upsert(&record).await?;

        Ok(self
            .cached(&record.ada)
            .await?
            .ok_or_else(|| AppError::not_found("Decision not found"))?)
    }

    /// Inserts or updates the cached copy of a decision. An existing ADA
    /// keeps its row and `created_at`; all content fields are replaced
    /// and `updated_at`/`last_fetched_at` move to now.
    pub async fn upsert(&self, record: &DecisionRecord) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"INSERT INTO diavgeia_decisions
               (ada, subject, protocol_number, decision_type_id, organization_id,
                organization_label, issue_date, document_url, status,
                submitter_uid, unit_uid, thematic_category_ids,
                attachments, extra_field_values, private_data,
                created_at, updated_at, last_fetched_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(ada) DO UPDATE SET
                   subject = excluded.subject,
                   protocol_number = excluded.protocol_number,
                   decision_type_id = excluded.decision_type_id,
                   organization_id = excluded.organization_id,
                   organization_label = excluded.organization_label,
                   issue_date = excluded.issue_date,
                   document_url = excluded.document_url,
                   status = excluded.status,
                   submitter_uid = excluded.submitter_uid,
                   unit_uid = excluded.unit_uid,
                   thematic_category_ids = excluded.thematic_category_ids,
                   attachments = excluded.attachments,
                   extra_field_values = excluded.extra_field_values,
                   private_data = excluded.private_data,
                   updated_at = excluded.updated_at,
                   last_fetched_at = excluded.last_fetched_at"#,
        )
        .bind(&record.ada)
        .bind(&record.subject)
        .bind(&record.protocol_number)
        .bind(&record.decision_type_id)
        .bind(&record.organization_id)
        .bind(&record.organization_label)
        .bind(&record.issue_date)
        .bind(&record.document_url)
        .bind(&record.status)
        .bind(&record.submitter_uid)
        .bind(&record.unit_uid)
        .bind(blob_or(&record.thematic_category_ids, "[]"))
        .bind(blob_or(&record.attachments, "[]"))
        .bind(blob_or(&record.extra_field_values, "{}"))
        .bind(blob_or(&record.private_data, "{}"))
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to upsert decision into cache")?;

        Ok(())
    }

    /// Cache-mode search: local rows only, all provided filters ANDed,
    /// newest issue date first, with an independently computed total for
    /// pagination.
    pub async fn search_cache(&self, filters: &CacheSearchFilters) -> Result<CachedDecisionPage> {
        let size = clamp_page_size(filters.size);
        let offset = i64::from(filters.page) * i64::from(size);

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM diavgeia_decisions WHERE 1=1");
        push_filters(&mut query, filters);
        query.push(" ORDER BY issue_date DESC, updated_at DESC LIMIT ");
        query.push_bind(i64::from(size));
        query.push(" OFFSET ");
        query.push_bind(offset);

        let decisions = query
            .build_query_as::<Decision>()
            .fetch_all(&self.pool)
            .await
            .context("Failed to search decision cache")?;

        let mut count: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM diavgeia_decisions WHERE 1=1");
        push_filters(&mut count, filters);

        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("Failed to count matching cached decisions")?;

        Ok(CachedDecisionPage {
            decisions,
            info: SearchInfo {
                page: filters.page,
                size,
                total,
                source: "cache".to_string(),
            },
        })
    }

    /// Remote-mode search: the registry does the filtering; every decision
    /// it returns is cached before the response goes back to the caller.
    /// A per-record cache write failure is logged and skipped so one bad
    /// record never fails the whole search.
    pub async fn search_remote(
        &self,
        query: &RegistryQuery,
    ) -> Result<RegistrySearchResponse, AppError> {
        let mut query = query.clone();
        query.size = clamp_page_size(query.size);

        let response = self.registry.search(&query).await?;

        for decision in &response.decisions {
            if decision.ada.is_empty() {
                warn!("Skipping registry search result without an ADA");
                continue;
            }
            if let Err(e) = self.upsert(decision).await {
                error!("Failed to cache decision {}: {:?}", decision.ada, e);
            }
        }

        Ok(response)
    }

    pub async fn stats(&self) -> Result<DiavgeiaStats> {
        let total_cached: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM diavgeia_decisions")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count cached decisions")?;

        let linked_to_cases: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT decision_ada) FROM case_diavgeia_links")
                .fetch_one(&self.pool)
                .await
                .context("Failed to count linked decisions")?;

        let recent_decisions: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM diavgeia_decisions WHERE issue_date >= date('now', '-30 days')",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count recent decisions")?;

        Ok(DiavgeiaStats {
            total_cached,
            linked_to_cases,
            recent_decisions,
        })
    }
}

pub fn clamp_page_size(size: u32) -> u32 {
    if size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        size.min(MAX_PAGE_SIZE)
    }
}

/// Blob fields are stored as serialized JSON and default to an empty
/// structure when the registry omitted them, never NULL.
fn blob_or(value: &serde_json::Value, empty: &str) -> String {
    if value.is_null() {
        empty.to_string()
    } else {
        value.to_string()
    }
}

/// Appends the WHERE predicates for a filter set. Shared by the page
/// query and the count query so the two can never disagree.
fn push_filters(query: &mut QueryBuilder<Sqlite>, filters: &CacheSearchFilters) {
    if let Some(q) = trimmed(&filters.q) {
        let like = format!("%{q}%");
        query.push(" AND (subject LIKE ");
        query.push_bind(like.clone());
        query.push(" OR ada LIKE ");
        query.push_bind(like.clone());
        query.push(" OR protocol_number LIKE ");
        query.push_bind(like);
        query.push(")");
    }
    if let Some(org) = trimmed(&filters.org) {
        query.push(" AND organization_id LIKE ");
        query.push_bind(format!("%{org}%"));
    }
    if let Some(decision_type) = trimmed(&filters.decision_type) {
        query.push(" AND decision_type_id = ");
        query.push_bind(decision_type.to_string());
    }
    if let Some(from_date) = trimmed(&filters.from_date) {
        query.push(" AND issue_date >= ");
        query.push_bind(from_date.to_string());
    }
    if let Some(to_date) = trimmed(&filters.to_date) {
        query.push(" AND issue_date <= ");
        query.push_bind(to_date.to_string());
    }
    if let Some(status) = trimmed(&filters.status) {
        query.push(" AND status = ");
        query.push_bind(status.to_string());
    }
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
