// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a customer record.
///
/// Stored as plain text in SQLite; `sqlx::Type` maps the variant names
/// directly to the stored strings.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::Type)]
pub enum CustomerStatus {
    #[default]
    Active,
    Lead,
    Inactive,
}

/// Represents a customer within the system.
///
/// Derivation attributes (derive):
/// - `Serialize`, `Deserialize`: Allows conversion to/from JSON.
/// - `sqlx::FromRow`: Allows `sqlx` to create a `Customer` instance
///   directly from a database result row.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Customer {
    pub id: i64,

    /// Human-facing identifier; either assigned on creation or
    /// auto-numbered as the next unused integer string.
    pub customer_code: String,

    pub name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub status: CustomerStatus,
    pub segment: String,
    pub owner: String,
    pub notes: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Represents a case (a unit of office work for a client).
///
/// `client_name` is denormalized on purpose: it is the display name the
/// case was opened under, not a foreign key into `customers`.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Case {
    pub id: i64,
    pub case_number: String,
    pub client_name: String,
    pub reference_number: String,
    pub case_date: String,
    pub notes: String,

    /// Free text; "Completed" is the one value with meaning elsewhere
    /// (the dashboard excludes completed cases from the active count).
    pub status: String,
    pub due_date: String,

    /// Relative folder on the file share, derived from `case_number` and
    /// `client_name` at create/update time.
    pub storage_folder_path: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Represents a scheduled task, optionally associated with a case.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Task {
    pub id: i64,
    pub title: String,

    // Start/end are stored verbatim as the ISO strings the client sent;
    // they may carry no timezone, so they are not parsed into instants.
    pub start_iso: String,
    pub end_iso: String,

    pub notes: String,

    /// Weak back-reference; `None` for unassociated tasks.
    pub case_id: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A locally cached decision record from the Diavgeia registry.
///
/// The row is a cache, not the source of truth: the remote registry stays
/// authoritative for content, and `last_fetched_at` records when this copy
/// was last refreshed from it. The blob columns hold serialized JSON
/// structures and default to empty ones, never NULL.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct Decision {
    pub id: i64,

    /// Globally unique identifier assigned by the registry.
    pub ada: String,

    pub subject: String,
    pub protocol_number: String,
    pub decision_type_id: String,
    pub organization_id: String,
    pub organization_label: String,
    pub issue_date: String,
    pub document_url: String,
    pub status: String,
    pub submitter_uid: String,
    pub unit_uid: String,

    pub thematic_category_ids: String,
    pub attachments: String,
    pub extra_field_values: String,
    pub private_data: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_fetched_at: DateTime<Utc>,
}

/// A link between a case and a cached decision, with free-text notes.
#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct CaseDecisionLink {
    pub id: i64,
    pub case_id: i64,
    pub decision_ada: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// A case-decision link joined with the cached decision it points at.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LinkedDecision {
    pub id: i64,
    pub case_id: i64,
    pub decision_ada: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub decision: Decision,
}

// --- API payloads ---
// It's a good practice to separate database models from API models, as
// they may have different fields. Required-by-validation fields stay
// Options here so the handlers can answer with the application's own
// error envelope instead of a deserialization rejection.

#[derive(Deserialize, Debug, Default)]
pub struct CreateCustomerPayload {
    pub customer_code: Option<String>,
    pub name: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<CustomerStatus>,
    pub segment: Option<String>,
    pub owner: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateCustomerPayload {
    pub customer_code: Option<String>,
    pub name: Option<String>,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<CustomerStatus>,
    pub segment: Option<String>,
    pub owner: Option<String>,
    pub notes: Option<String>,
}

/// Shared by case creation and update; both require `case_number` and
/// `client_name` and re-derive the storage folder from them.
#[derive(Deserialize, Debug, Default)]
pub struct CasePayload {
    pub case_number: Option<String>,
    pub client_name: Option<String>,
    pub reference_number: Option<String>,
    pub case_date: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub due_date: Option<String>,

    /// When present, replaces the explicit customer links as a set.
    pub customer_ids: Option<Vec<i64>>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SetCaseCustomersPayload {
    pub customer_ids: Option<Vec<i64>>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CreateTaskPayload {
    pub title: Option<String>,
    pub start_iso: Option<String>,
    pub end_iso: Option<String>,
    pub notes: Option<String>,
    pub case_id: Option<i64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct CreateDecisionLinkPayload {
    pub decision_ada: Option<String>,
    pub notes: Option<String>,
}

// --- Composite API responses ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CaseDetails {
    pub case: Case,
    pub customers: Vec<Customer>,
    pub tasks: Vec<Task>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CustomerDetails {
    pub customer: Customer,
    pub cases: Vec<Case>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub total_customers: i64,
    pub active_cases: i64,
    pub completed_cases: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DiavgeiaStats {
    pub total_cached: i64,
    pub linked_to_cases: i64,
    pub recent_decisions: i64,
}

/// Pagination info attached to cache-mode decision searches.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchInfo {
    pub page: u32,
    pub size: u32,
    pub total: i64,
    pub source: String,
}

/// One page of locally cached decisions.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CachedDecisionPage {
    pub decisions: Vec<Decision>,
    pub info: SearchInfo,
}
