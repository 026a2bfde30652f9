//! Post ingestion.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use tracing::info;
use uuid::Uuid;

use super::AppState;
use crate::config::Config;
use crate::error::{ApiError, StoreError};
use crate::models::Post;
use crate::store::DocumentStore;

/// Decode a request body into a [`Post`].
pub fn parse_post(body: &[u8]) -> Result<Post, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::MalformedPayload(e.to_string()))
}

/// Write `post` under a fresh id with forced refresh; returns the id.
pub async fn save_post(
    store: &dyn DocumentStore,
    config: &Config,
    post: &Post,
) -> Result<String, StoreError> {
    let id = Uuid::new_v4().to_string();
    let document = serde_json::to_value(post)
        .map_err(|e| StoreError::write(format!("Failed to encode post: {}", e)))?;

    store
        .upsert(&config.index_name, &config.doc_type, &id, &document, true)
        .await?;

    info!("Post {} is saved to index {}: {}", id, config.index_name, post.message);
    Ok(id)
}

/// `POST /post`
pub async fn post_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<String, ApiError> {
    info!("Received one post request");

    let post = parse_post(&body)?;
    let store = state.store.as_ref();
    save_post(store, &state.config, &post).await?;

    Ok(format!("Post received:{}\n", post.message))
}
