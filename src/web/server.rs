use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::store::{demo_records, LocationStore, StoreError};

use super::api::locations as location_handlers;
use super::api::path as path_handlers;
use super::api::source as source_handlers;
use super::api::tracker as tracker_handlers;
use super::api_doc::ApiDoc;
use super::config::{Config, ConfigError};
use super::state::AppState;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Tracker API endpoints
        .route("/api/tracker/start", post(tracker_handlers::start))
        .route("/api/tracker/stop", post(tracker_handlers::stop))
        .route("/api/tracker/status", get(tracker_handlers::status))
        .route("/api/tracker/events", get(tracker_handlers::events))
        // Location history
        .route(
            "/api/locations",
            get(location_handlers::list)
                .post(location_handlers::insert)
                .delete(location_handlers::delete),
        )
        .route("/api/locations/recent", get(location_handlers::recent))
        .route("/api/locations/count", get(location_handlers::count))
        .route("/api/locations/seed", post(location_handlers::seed))
        .route("/api/locations/stream", get(location_handlers::stream))
        // Projection
        .route("/api/path", get(path_handlers::path))
        .route("/api/projection", get(path_handlers::projection))
        // Position source
        .route("/api/source/fix", get(source_handlers::current_fix))
        .route("/api/source/fixes", post(source_handlers::push_fix))
        .route("/api/source/disable", post(source_handlers::disable))
        .route("/api/source/enable", post(source_handlers::enable))
        .route(
            "/api/source/authorization",
            put(source_handlers::set_authorization),
        )
        // OpenAPI / Swagger
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Opens the store, inserting the demo track first when configured and empty.
pub fn open_store(config: &Config) -> Result<Arc<LocationStore>, StoreError> {
    let store = LocationStore::open(&config.store.path)?;
    if config.store.seed_when_empty && store.count()? == 0 {
        let seeded = store.insert_many(demo_records(chrono::Utc::now().timestamp_millis()))?;
        log::info!("Store was empty, seeded {} demo locations", seeded.len());
    }
    Ok(Arc::new(store))
}

pub async fn run_server(config: Config) -> Result<(), ServerError> {
    let bind_addr = config.web.bind.clone();
    let store = open_store(&config)?;
    let source = config.source.build()?;
    let state = AppState::new(config, store, source);
    let tracker = state.tracker.clone();

    let app = build_router(state);

    log::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain whatever the writer still holds before exiting
    let mode = tracker.lock().await.stop().await;
    log::info!("Server stopped, tracker {:?}", mode);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}
