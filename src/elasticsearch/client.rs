//! Elasticsearch client wrapper.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use elasticsearch::{
    cluster::ClusterHealthParts,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    params::Refresh,
    Elasticsearch, IndexParts, SearchParts,
};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::error::StoreError;
use crate::query::GeoDistanceQuery;
use crate::store::{DocumentStore, SearchHits};

/// Elasticsearch-backed document store with a per-request time bound
#[derive(Clone)]
pub struct EsStore {
    client: Elasticsearch,
    timeout: Duration,
}

impl EsStore {
    /// Create a new Elasticsearch client. No request is made until the first call.
    pub fn new(es_url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(es_url)?;
        let conn_pool = SingleNodeConnectionPool::new(url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .timeout(timeout)
            .build()?;

        let client = Elasticsearch::new(transport);

        Ok(Self { client, timeout })
    }

    /// Run one round trip, mapping an elapsed deadline to `Unavailable`.
    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::unavailable(format!(
                "{} timed out after {}ms",
                op,
                self.timeout.as_millis()
            ))),
        }
    }

    async fn exists_request(&self, index: &str) -> Result<bool, StoreError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status_code();
        if status.is_success() {
            Ok(true)
        } else if status.as_u16() == 404 {
            Ok(false)
        } else {
            Err(StoreError::unavailable(format!(
                "index exists check for {} returned {}",
                index, status
            )))
        }
    }

    async fn create_request(&self, index: &str, mapping: &Value) -> Result<(), StoreError> {
        info!("Creating index: {}", index);
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(mapping.clone())
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status_code().is_success() {
            let error_body = response.text().await.map_err(transport_error)?;
            return Err(StoreError::index_creation(error_body));
        }

        Ok(())
    }

    async fn index_request(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        document: &Value,
        refresh: bool,
    ) -> Result<(), StoreError> {
        let refresh = if refresh { Refresh::True } else { Refresh::False };
        let response = self
            .client
            .index(IndexParts::IndexId(index, id))
            .body(document.clone())
            .refresh(refresh)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status_code().is_success() {
            let error_body = response.text().await.map_err(transport_error)?;
            return Err(StoreError::write(error_body));
        }

        debug!("Indexed {} document {} into {}", doc_type, id, index);
        Ok(())
    }

    async fn search_request(
        &self,
        index: &str,
        query: &GeoDistanceQuery,
    ) -> Result<SearchHits, StoreError> {
        let body = query.to_es_body();
        debug!("Search query: {}", body);

        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status_code().is_success() {
            let error_body = response.text().await.map_err(transport_error)?;
            return Err(StoreError::query(error_body));
        }

        let response_body = response
            .json::<Value>()
            .await
            .map_err(|e| StoreError::query(e.to_string()))?;

        Ok(parse_search_response(&response_body))
    }

    async fn health_request(&self) -> Result<bool, StoreError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(transport_error)?;

        Ok(response.status_code().is_success())
    }
}

fn transport_error(err: elasticsearch::Error) -> StoreError {
    StoreError::unavailable(err.to_string())
}

/// Read `took`, the hit total and each hit's `_source` out of a search response.
pub(crate) fn parse_search_response(body: &Value) -> SearchHits {
    let took_ms = body["took"].as_u64().unwrap_or(0);
    // 7.x+ reports {"value": n, "relation": ..}; older clusters report a bare number
    let total_hits = body["hits"]["total"]["value"]
        .as_u64()
        .or_else(|| body["hits"]["total"].as_u64())
        .unwrap_or(0);
    let documents = body["hits"]["hits"]
        .as_array()
        .map(|hits| hits.iter().map(|hit| hit["_source"].clone()).collect())
        .unwrap_or_default();

    SearchHits {
        documents,
        took_ms,
        total_hits,
    }
}

#[async_trait]
impl DocumentStore for EsStore {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let request = self.exists_request(index);
        self.bounded("index exists", request).await
    }

    async fn create_index(&self, index: &str, mapping: &Value) -> Result<(), StoreError> {
        let request = self.create_request(index, mapping);
        self.bounded("create index", request).await
    }

    async fn upsert(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        document: &Value,
        refresh: bool,
    ) -> Result<(), StoreError> {
        let request = self.index_request(index, doc_type, id, document, refresh);
        self.bounded("index document", request).await
    }

    async fn search(
        &self,
        index: &str,
        query: &GeoDistanceQuery,
    ) -> Result<SearchHits, StoreError> {
        let request = self.search_request(index, query);
        self.bounded("search", request).await
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        self.bounded("cluster health", self.health_request()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::extract::{Path, RawQuery, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Json, Response};
    use axum::routing::{head, post, put};
    use axum::Router;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    #[test]
    fn test_parse_search_response() {
        let body = json!({
            "took": 3,
            "hits": {
                "total": { "value": 2, "relation": "eq" },
                "hits": [
                    { "_id": "a", "_source": { "user": "alice" } },
                    { "_id": "b", "_source": { "user": "bob" } }
                ]
            }
        });

        let hits = parse_search_response(&body);
        assert_eq!(hits.took_ms, 3);
        assert_eq!(hits.total_hits, 2);
        assert_eq!(
            hits.documents,
            vec![json!({ "user": "alice" }), json!({ "user": "bob" })]
        );
    }

    #[test]
    fn test_parse_legacy_total() {
        let body = json!({ "took": 1, "hits": { "total": 7, "hits": [] } });
        let hits = parse_search_response(&body);
        assert_eq!(hits.total_hits, 7);
        assert!(hits.documents.is_empty());
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(EsStore::new("not a url", Duration::from_secs(1)).is_err());
    }

    /// Query strings seen by the fake cluster's document route
    type SeenQueries = Arc<Mutex<Vec<String>>>;

    fn es_response(status: StatusCode, body: Value) -> Response {
        (status, [("x-elastic-product", "Elasticsearch")], Json(body)).into_response()
    }

    fn rejection(reason: &str) -> Value {
        json!({ "error": { "type": reason }, "status": 400 })
    }

    async fn fake_exists(Path(index): Path<String>) -> Response {
        match index.as_str() {
            "around" => es_response(StatusCode::NOT_FOUND, json!({})),
            "broken" => es_response(StatusCode::INTERNAL_SERVER_ERROR, json!({})),
            _ => es_response(StatusCode::OK, json!({})),
        }
    }

    async fn fake_create(Path(index): Path<String>) -> Response {
        if index == "bad" {
            es_response(StatusCode::BAD_REQUEST, rejection("mapper_parsing_exception"))
        } else {
            es_response(StatusCode::OK, json!({ "acknowledged": true }))
        }
    }

    async fn fake_index(
        State(seen): State<SeenQueries>,
        Path((index, _id)): Path<(String, String)>,
        RawQuery(query): RawQuery,
    ) -> Response {
        seen.lock().await.push(query.unwrap_or_default());
        if index == "bad" {
            es_response(StatusCode::BAD_REQUEST, rejection("document_parsing_exception"))
        } else {
            es_response(StatusCode::CREATED, json!({ "result": "created" }))
        }
    }

    async fn fake_search(Path(index): Path<String>) -> Response {
        if index == "bad" {
            return es_response(StatusCode::BAD_REQUEST, rejection("query_shard_exception"));
        }
        es_response(
            StatusCode::OK,
            json!({
                "took": 4,
                "hits": {
                    "total": { "value": 1, "relation": "eq" },
                    "hits": [{ "_id": "a", "_source": { "user": "alice" } }]
                }
            }),
        )
    }

    /// Start a fake cluster on a local port.
    async fn fake_cluster() -> (EsStore, SeenQueries) {
        let seen = SeenQueries::default();
        let app = Router::new()
            .route("/{index}", head(fake_exists).put(fake_create))
            .route("/{index}/_doc/{id}", put(fake_index).post(fake_index))
            .route("/{index}/_search", post(fake_search).get(fake_search))
            .with_state(seen.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = format!("http://{}", addr);
        let store = EsStore::new(&url, Duration::from_secs(5)).unwrap();
        (store, seen)
    }

    #[tokio::test]
    async fn test_index_exists_status_mapping() {
        let (store, _) = fake_cluster().await;

        assert!(!store.index_exists("around").await.unwrap());
        assert!(store.index_exists("present").await.unwrap());
        assert!(matches!(
            store.index_exists("broken").await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_create_index_rejection() {
        let (store, _) = fake_cluster().await;
        let mapping = json!({ "mappings": {} });

        store.create_index("around", &mapping).await.unwrap();
        assert!(matches!(
            store.create_index("bad", &mapping).await,
            Err(StoreError::IndexCreation(_))
        ));
    }

    #[tokio::test]
    async fn test_upsert_sends_refresh() {
        let (store, seen) = fake_cluster().await;
        let doc = json!({ "user": "alice" });

        store
            .upsert("around", "post", "a", &doc, true)
            .await
            .unwrap();
        assert!(matches!(
            store.upsert("bad", "post", "b", &doc, true).await,
            Err(StoreError::Write(_))
        ));

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert!(seen[0].contains("refresh=true"));
    }

    #[tokio::test]
    async fn test_search_mapping() {
        let (store, _) = fake_cluster().await;
        let query = GeoDistanceQuery::new(37.0, -120.0, 10.0, 10);

        let hits = store.search("around", &query).await.unwrap();
        assert_eq!(hits.took_ms, 4);
        assert_eq!(hits.total_hits, 1);
        assert_eq!(hits.documents, vec![json!({ "user": "alice" })]);

        assert!(matches!(
            store.search("bad", &query).await,
            Err(StoreError::Query(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_cluster_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and hold them open without ever answering
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let url = format!("http://{}", addr);
        let store = EsStore::new(&url, Duration::from_millis(200)).unwrap();
        let started = std::time::Instant::now();
        let result = store.index_exists("around").await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
