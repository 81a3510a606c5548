// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
pub mod config;
pub mod database;
pub mod diavgeia;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod routes;
pub mod share;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::diavgeia::DecisionCache;
use crate::share::FileShare;

/// Shared application state, injected into every handler through Axum's
/// `State` extractor. Holding the collaborators here (instead of module
/// globals) is what lets the tests substitute an in-memory registry fake
/// or a tempdir-backed share.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub cache: DecisionCache,
    pub share: Arc<dyn FileShare>,

    /// Relative share folder that holds per-case folders.
    pub share_base_dir: String,
    /// Relative share folder counted for the dashboard's completed-cases
    /// metric.
    pub share_completed_dir: String,
}
