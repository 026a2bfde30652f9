//! In-process document store.
//!
//! Mirrors the parts of Elasticsearch behavior the service relies on: explicit
//! index creation, dynamic index creation on first write, `geo_point` validation,
//! and inclusive geo-distance filtering in insertion order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use geo::{Distance, Haversine, Point};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use super::{DocumentStore, SearchHits};
use crate::error::StoreError;
use crate::query::GeoDistanceQuery;

struct StoredDocument {
    id: String,
    doc_type: String,
    source: Value,
}

struct MemoryIndex {
    mapping: Value,
    docs: Vec<StoredDocument>,
}

impl MemoryIndex {
    fn is_geo_point(&self, field: &str) -> bool {
        self.mapping
            .pointer(&format!("/mappings/properties/{}/type", field))
            .and_then(Value::as_str)
            == Some("geo_point")
    }

    fn geo_point_fields(&self) -> Vec<String> {
        self.mapping
            .pointer("/mappings/properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .filter(|(_, def)| def["type"].as_str() == Some("geo_point"))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Memory-backed [`DocumentStore`].
pub struct MemoryStore {
    indices: RwLock<HashMap<String, MemoryIndex>>,
    available: AtomicBool,
    indices_created: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            indices_created: AtomicUsize::new(0),
        }
    }

    /// Simulate the store going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of successful explicit `create_index` calls
    pub fn indices_created(&self) -> usize {
        self.indices_created.load(Ordering::SeqCst)
    }

    /// Number of documents held in `index`
    pub async fn document_count(&self, index: &str) -> usize {
        self.indices
            .read()
            .await
            .get(index)
            .map(|idx| idx.docs.len())
            .unwrap_or(0)
    }

    /// Document type recorded for `id`, if present
    pub async fn doc_type_of(&self, index: &str, id: &str) -> Option<String> {
        self.indices
            .read()
            .await
            .get(index)?
            .docs
            .iter()
            .find(|doc| doc.id == id)
            .map(|doc| doc.doc_type.clone())
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable("connection refused"))
        }
    }
}

/// Read a `{lat, lon}` object out of `doc[field]`.
fn geo_point(doc: &Value, field: &str) -> Option<Point<f64>> {
    let lat = doc[field]["lat"].as_f64()?;
    let lon = doc[field]["lon"].as_f64()?;
    Some(Point::new(lon, lat))
}

fn validate_geo_point(doc: &Value, field: &str) -> Result<(), StoreError> {
    if doc.get(field).is_none() {
        return Ok(());
    }
    let point = geo_point(doc, field).ok_or_else(|| {
        StoreError::write(format!("failed to parse field [{}] of type [geo_point]", field))
    })?;
    if !(-90.0..=90.0).contains(&point.y()) {
        return Err(StoreError::write(format!(
            "illegal latitude value [{}] for {}",
            point.y(),
            field
        )));
    }
    if !(-180.0..=180.0).contains(&point.x()) {
        return Err(StoreError::write(format!(
            "illegal longitude value [{}] for {}",
            point.x(),
            field
        )));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        self.ensure_available()?;
        Ok(self.indices.read().await.contains_key(index))
    }

    async fn create_index(&self, index: &str, mapping: &Value) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut indices = self.indices.write().await;
        if indices.contains_key(index) {
            return Err(StoreError::index_creation(format!(
                "resource_already_exists_exception: index [{}] already exists",
                index
            )));
        }

        indices.insert(
            index.to_string(),
            MemoryIndex {
                mapping: mapping.clone(),
                docs: Vec::new(),
            },
        );
        self.indices_created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        document: &Value,
        _refresh: bool,
    ) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut indices = self.indices.write().await;

        // Writing to a missing index creates it with a dynamic mapping, as Elasticsearch does
        let idx = indices.entry(index.to_string()).or_insert_with(|| MemoryIndex {
            mapping: json!({ "mappings": {} }),
            docs: Vec::new(),
        });

        for field in idx.geo_point_fields() {
            validate_geo_point(document, &field)?;
        }

        let stored = StoredDocument {
            id: id.to_string(),
            doc_type: doc_type.to_string(),
            source: document.clone(),
        };
        match idx.docs.iter().position(|doc| doc.id == id) {
            Some(pos) => idx.docs[pos] = stored,
            None => idx.docs.push(stored),
        }

        debug!("Stored document {} in memory index {}", id, index);
        Ok(())
    }

    async fn search(
        &self,
        index: &str,
        query: &GeoDistanceQuery,
    ) -> Result<SearchHits, StoreError> {
        self.ensure_available()?;
        let indices = self.indices.read().await;
        let idx = indices.get(index).ok_or_else(|| {
            StoreError::query(format!("index_not_found_exception: no such index [{}]", index))
        })?;

        if !idx.is_geo_point(&query.field) {
            return Err(StoreError::query(format!(
                "failed to find geo field [{}]",
                query.field
            )));
        }

        let center = Point::new(query.lon, query.lat);
        let matches: Vec<&Value> = idx
            .docs
            .iter()
            .map(|doc| &doc.source)
            .filter(|source| {
                geo_point(source, &query.field)
                    .map(|point| Haversine.distance(center, point) / 1000.0 <= query.radius_km)
                    .unwrap_or(false)
            })
            .collect();

        Ok(SearchHits {
            total_hits: matches.len() as u64,
            documents: matches
                .into_iter()
                .take(query.size)
                .cloned()
                .collect(),
            took_ms: 0,
        })
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(self.available.load(Ordering::SeqCst))
    }
}
