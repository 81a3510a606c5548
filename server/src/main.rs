// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::sync::Arc;

use axum::http::HeaderName;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use server::config::Config;
use server::diavgeia::DecisionCache;
use server::registry::HttpDecisionRegistry;
use server::share::MountedShare;
use server::{AppState, database, routes};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting up the server...");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {:?}", e);
            std::process::exit(1);
        }
    };

    let db_pool = match database::establish_connection_pool(&config.database_url).await {
        Ok(pool) => {
            tracing::info!("Database connection was made successfully.");
            pool
        }
        Err(e) => {
            tracing::error!("Failed to connect with the database: {:?}", e);
            std::process::exit(1);
        }
    };

    let registry = match HttpDecisionRegistry::new(&config.diavgeia_base_url) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!("Failed to build the registry client: {:?}", e);
            std::process::exit(1);
        }
    };

    let state = AppState {
        pool: db_pool.clone(),
        cache: DecisionCache::new(db_pool, Arc::new(registry)),
        share: Arc::new(MountedShare::new(config.share_mount.clone())),
        share_base_dir: config.share_base_dir.clone(),
        share_completed_dir: config.share_completed_dir.clone(),
    };

    let app_routes = routes::create_router(state);

    // The browser UI is served from another origin during development, so
    // allow everything except credentials.
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("accept"),
        ])
        .allow_origin(Any);

    let app = app_routes.layer(cors).layer(TraceLayer::new_for_http());

    tracing::info!("The server listens on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
