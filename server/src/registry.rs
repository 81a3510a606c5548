// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

/// Public open-data endpoint of the Diavgeia transparency registry.
pub const DIAVGEIA_BASE_URL: &str = "https://diavgeia.gov.gr/luminapi/opendata";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry has no record for this ADA (remote 404).
    #[error("Decision with ADA {0} not found")]
    NotFound(String),

    /// The registry answered with a non-2xx status other than 404.
    #[error("Diavgeia API error: {status} - {reason}")]
    Api { status: u16, reason: String },

    /// The request never completed (connect failure, timeout, bad body).
    #[error("Diavgeia API request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A decision as the registry serializes it (camelCase JSON). Absent
/// fields default so partial records still deserialize.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DecisionRecord {
    pub ada: String,
    pub subject: String,
    pub protocol_number: String,
    pub decision_type_id: String,
    pub organization_id: String,
    pub organization_label: String,

    // The registry serves issue dates either as ISO strings or as epoch
    // milliseconds depending on the endpoint.
    #[serde(deserialize_with = "string_or_number")]
    pub issue_date: String,

    pub document_url: String,
    pub status: String,
    pub submitter_uid: String,
    pub unit_uid: String,

    pub thematic_category_ids: serde_json::Value,
    pub attachments: serde_json::Value,
    pub extra_field_values: serde_json::Value,
    pub private_data: serde_json::Value,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Filter set forwarded verbatim to the registry's search operation.
#[derive(Debug, Clone, Default)]
pub struct RegistryQuery {
    pub q: Option<String>,
    pub ada: Option<String>,
    pub subject: Option<String>,
    pub protocol: Option<String>,
    pub org: Option<String>,
    pub decision_type: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub status: Option<String>,
    pub sort: Option<String>,
    pub page: u32,
    pub size: u32,
}

impl RegistryQuery {
    fn to_params(&self) -> Vec<(&'static str, String)> {
        let optional = [
            ("q", &self.q),
            ("ada", &self.ada),
            ("subject", &self.subject),
            ("protocol", &self.protocol),
            ("org", &self.org),
            ("type", &self.decision_type),
            ("from_date", &self.from_date),
            ("to_date", &self.to_date),
            ("status", &self.status),
        ];

        let mut params: Vec<(&'static str, String)> = optional
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| (key, v.clone())))
            .collect();
        params.push(("page", self.page.to_string()));
        params.push(("size", self.size.to_string()));
        if let Some(sort) = &self.sort {
            params.push(("sort", sort.clone()));
        }
        params
    }
}

/// Search response passed back to the caller as the registry shaped it.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RegistrySearchResponse {
    #[serde(default)]
    pub decisions: Vec<DecisionRecord>,
    #[serde(default)]
    pub info: serde_json::Value,
}

/// The remote, authoritative, read-only source of decision records.
///
/// Both operations are one-shot: a bounded timeout, no retry, no
/// cancellation. 404 on single-record lookup is the one failure that is
/// not an upstream error.
#[async_trait]
pub trait DecisionRegistry: Send + Sync {
    async fn get(&self, ada: &str) -> Result<DecisionRecord, RegistryError>;

    async fn search(&self, query: &RegistryQuery)
    -> Result<RegistrySearchResponse, RegistryError>;
}

/// reqwest-backed registry client.
pub struct HttpDecisionRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDecisionRegistry {
    pub fn new(base_url: &str) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DecisionRegistry for HttpDecisionRegistry {
    async fn get(&self, ada: &str) -> Result<DecisionRecord, RegistryError> {
        let url = format!("{}/decisions/{}", self.base_url, ada);
        debug!("Fetching decision {} from the registry", ada);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(ada.to_string()));
        }
        if !status.is_success() {
            return Err(RegistryError::Api {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        Ok(response.json::<DecisionRecord>().await?)
    }

    async fn search(
        &self,
        query: &RegistryQuery,
    ) -> Result<RegistrySearchResponse, RegistryError> {
        let url = format!("{}/search", self.base_url);
        debug!("Searching the registry: {:?}", query);

        let response = self
            .client
            .get(&url)
            .query(&query.to_params())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Api {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        Ok(response.json::<RegistrySearchResponse>().await?)
    }
}
