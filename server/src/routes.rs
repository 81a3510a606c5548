// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};

use crate::AppState;
use crate::handlers;

// Uploads go through memory before landing on the share; cap them well
// above any office document size.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Creates and configures the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Cases
        .route("/api/cases", get(handlers::cases::list_cases))
        .route("/api/cases", post(handlers::cases::create_case))
        .route("/api/cases/{id}", get(handlers::cases::get_case))
        .route("/api/cases/{id}", put(handlers::cases::update_case))
        .route("/api/cases/{id}/details", get(handlers::cases::case_details))
        .route(
            "/api/cases/{id}/customers",
            get(handlers::cases::get_case_customers),
        )
        .route(
            "/api/cases/{id}/customers",
            put(handlers::cases::set_case_customers),
        )
        // Case files on the share
        .route(
            "/api/cases/{id}/files/ensure-folder",
            post(handlers::files::ensure_case_folder),
        )
        .route("/api/cases/{id}/files", get(handlers::files::list_case_files))
        .route(
            "/api/cases/{id}/files/upload",
            post(handlers::files::upload_case_file),
        )
        .route(
            "/api/cases/{id}/files/download",
            get(handlers::files::download_case_file),
        )
        // Customers
        .route("/api/customers", get(handlers::customers::list_customers))
        .route("/api/customers", post(handlers::customers::create_customer))
        .route(
            "/api/customers/{id}",
            put(handlers::customers::update_customer),
        )
        .route(
            "/api/customers/{id}/details",
            get(handlers::customers::customer_details),
        )
        // Tasks
        .route("/api/tasks", get(handlers::tasks::list_tasks))
        .route("/api/tasks", post(handlers::tasks::create_task))
        .route(
            "/api/cases/{id}/tasks",
            post(handlers::tasks::create_case_task),
        )
        // Dashboard
        .route(
            "/api/dashboard/metrics",
            get(handlers::dashboard::dashboard_metrics),
        )
        // Diavgeia decision cache
        .route(
            "/api/diavgeia/search",
            get(handlers::diavgeia::search_decisions),
        )
        .route(
            "/api/diavgeia/decisions/{ada}",
            get(handlers::diavgeia::get_decision),
        )
        .route(
            "/api/diavgeia/fetch/{ada}",
            post(handlers::diavgeia::fetch_decision),
        )
        .route(
            "/api/cases/{id}/diavgeia-links",
            post(handlers::diavgeia::create_decision_link),
        )
        .route(
            "/api/cases/{id}/diavgeia-links",
            get(handlers::diavgeia::list_decision_links),
        )
        .route(
            "/api/cases/{id}/diavgeia-links/{link_id}",
            delete(handlers::diavgeia::delete_decision_link),
        )
        .route("/api/diavgeia/stats", get(handlers::diavgeia::diavgeia_stats))
        // Health
        .route("/api/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        // Adds the shared state to the application
        .with_state(state)
}
