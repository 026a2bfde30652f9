//! HTTP surface: post ingestion, geo search and health.

pub mod post;
pub mod search;


use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post as post_route},
    Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::store::DocumentStore;

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, config: Config) -> Self {
        Self { store, config }
    }
}

/// Build the service router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/post", post_route(post::post_handler))
        .route("/search", get(search::search_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: bool,
}

/// Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let healthy = state.store.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        store: healthy,
    })
}
