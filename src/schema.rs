//! Index schema management.

use serde_json::Value;
use tracing::info;

use crate::error::StoreError;
use crate::store::DocumentStore;

/// Schema JSON embedded at compile time
const POST_MAPPING: &str = include_str!("../schema/post_mapping.json");

/// Mapping for the post index: `location` as `geo_point`, everything else dynamic.
pub fn post_mapping(doc_type: &str) -> Result<Value, StoreError> {
    let mut mapping: Value = serde_json::from_str(POST_MAPPING).map_err(|e| {
        StoreError::index_creation(format!("Failed to parse post_mapping.json: {}", e))
    })?;
    mapping["mappings"]["_meta"]["doc_type"] = Value::String(doc_type.to_string());
    Ok(mapping)
}

/// Create the post index with the geo-point mapping unless it already exists.
///
/// Returns `true` when the index was created by this call.
pub async fn ensure_index(
    store: &dyn DocumentStore,
    index_name: &str,
    doc_type: &str,
) -> Result<bool, StoreError> {
    if store.index_exists(index_name).await? {
        info!("Index {} already exists, skipping creation", index_name);
        return Ok(false);
    }

    let mapping = post_mapping(doc_type)?;
    store.create_index(index_name, &mapping).await?;

    info!("Index {} created successfully", index_name);
    Ok(true)
}
