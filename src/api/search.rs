//! Geo-distance search over stored posts.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::AppState;
use crate::config::Config;
use crate::error::{ApiError, StoreError};
use crate::models::Post;
use crate::query::GeoDistanceQuery;
use crate::store::DocumentStore;

/// Raw `/search` parameters. Kept as strings so parsing leniency is ours to decide.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQueryParams {
    pub lat: Option<String>,
    pub lon: Option<String>,
    /// Radius in kilometers
    pub range: Option<String>,
}

/// `None` when absent or blank, `Some(Err(raw))` when present but not a finite number.
fn parse_param(raw: &Option<String>) -> Option<Result<f64, String>> {
    let raw = raw.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    Some(
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| raw.to_string()),
    )
}

fn coordinate(name: &str, raw: &Option<String>, strict: bool) -> Result<f64, ApiError> {
    match parse_param(raw) {
        Some(Ok(value)) => Ok(value),
        Some(Err(raw)) if strict => Err(ApiError::MalformedPayload(format!(
            "{} must be a number, got {:?}",
            name, raw
        ))),
        None if strict => Err(ApiError::MalformedPayload(format!("missing {}", name))),
        _ => Ok(0.0),
    }
}

fn radius(raw: &Option<String>, config: &Config) -> Result<f64, ApiError> {
    match parse_param(raw) {
        None => Ok(config.default_radius_km),
        Some(Ok(value)) if value >= 0.0 => Ok(value),
        Some(_) if config.strict_coordinates => Err(ApiError::MalformedPayload(format!(
            "range must be a non-negative number of kilometers, got {:?}",
            raw.as_deref().unwrap_or_default()
        ))),
        Some(_) => {
            warn!(
                "Ignoring invalid range {:?}, using {}km",
                raw.as_deref().unwrap_or_default(),
                config.default_radius_km
            );
            Ok(config.default_radius_km)
        }
    }
}

impl SearchQueryParams {
    /// Resolve parameters into a query, filling in defaults from `config`.
    pub fn to_query(&self, config: &Config) -> Result<GeoDistanceQuery, ApiError> {
        let lat = coordinate("lat", &self.lat, config.strict_coordinates)?;
        let lon = coordinate("lon", &self.lon, config.strict_coordinates)?;
        let radius_km = radius(&self.range, config)?;

        Ok(GeoDistanceQuery::new(lat, lon, radius_km, config.max_results))
    }
}

/// Run `query` and decode the hits, in store order.
///
/// At most `query.size` posts come back; further matches are dropped and only
/// show up in the logged total. Hits that do not decode as a [`Post`] are skipped.
pub async fn find_posts(
    store: &dyn DocumentStore,
    index_name: &str,
    query: &GeoDistanceQuery,
) -> Result<Vec<Post>, StoreError> {
    let hits = store.search(index_name, query).await?;
    info!("Query took {} milliseconds", hits.took_ms);
    info!("Found a total of {} posts", hits.total_hits);

    let posts = hits
        .documents
        .into_iter()
        .filter_map(|doc| match serde_json::from_value::<Post>(doc) {
            Ok(post) => {
                debug!(
                    "Post by {}: {} at lat {} and lon {}",
                    post.user, post.message, post.location.lat, post.location.lon
                );
                Some(post)
            }
            Err(e) => {
                warn!("Skipping undecodable hit: {}", e);
                None
            }
        })
        .collect();

    Ok(posts)
}

/// `GET /search?lat=&lon=&range=`
///
/// Returns the first `max_results` matches (10 by default) in store order.
/// There is no paging, so matches past the cap are not reachable.
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    info!("Received one request for search");

    let query = params.to_query(&state.config)?;
    info!(
        "Search received: {} {} {}",
        query.lat,
        query.lon,
        query.distance()
    );

    let store = state.store.as_ref();
    let posts = find_posts(store, &state.config.index_name, &query).await?;

    Ok(([(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")], Json(posts)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(lat: Option<&str>, lon: Option<&str>, range: Option<&str>) -> SearchQueryParams {
        SearchQueryParams {
            lat: lat.map(String::from),
            lon: lon.map(String::from),
            range: range.map(String::from),
        }
    }

    #[test]
    fn test_explicit_params() {
        let query = params(Some("37.5"), Some("-120"), Some("10"))
            .to_query(&Config::default())
            .unwrap();
        assert_eq!(query.lat, 37.5);
        assert_eq!(query.lon, -120.0);
        assert_eq!(query.radius_km, 10.0);
        assert_eq!(query.size, 10);
    }

    #[test]
    fn test_default_radius() {
        let config = Config::default();
        let omitted = params(Some("1"), Some("2"), None).to_query(&config).unwrap();
        let blank = params(Some("1"), Some("2"), Some("")).to_query(&config).unwrap();
        let explicit = params(Some("1"), Some("2"), Some("200")).to_query(&config).unwrap();
        assert_eq!(omitted, explicit);
        assert_eq!(blank, explicit);
    }

    #[test]
    fn test_lenient_coordinates_default_to_zero() {
        let query = params(Some("north"), None, Some("5"))
            .to_query(&Config::default())
            .unwrap();
        assert_eq!(query.lat, 0.0);
        assert_eq!(query.lon, 0.0);
        assert_eq!(query.radius_km, 5.0);
    }

    #[test]
    fn test_lenient_invalid_range_uses_default() {
        let query = params(Some("1"), Some("1"), Some("-3"))
            .to_query(&Config::default())
            .unwrap();
        assert_eq!(query.radius_km, 200.0);

        let query = params(Some("1"), Some("1"), Some("NaN"))
            .to_query(&Config::default())
            .unwrap();
        assert_eq!(query.radius_km, 200.0);
    }

    #[test]
    fn test_strict_mode_rejects() {
        let config = Config {
            strict_coordinates: true,
            ..Config::default()
        };

        for bad in [
            params(Some("abc"), Some("1"), None),
            params(Some("1"), None, None),
            params(Some("1"), Some("1"), Some("far")),
            params(Some("inf"), Some("1"), None),
        ] {
            let err = bad.to_query(&config).unwrap_err();
            assert!(matches!(err, ApiError::MalformedPayload(_)));
        }

        assert!(params(Some("1"), Some("1"), None).to_query(&config).is_ok());
    }
}
