//! Geo-distance query building.

use serde_json::{json, Value};

/// Field holding the post coordinate, mapped as `geo_point`.
pub const LOCATION_FIELD: &str = "location";

/// Documents whose geo-point `field` lies within `radius_km` of (`lat`, `lon`).
///
/// Points at exactly `radius_km` are included.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoDistanceQuery {
    pub field: String,
    pub lat: f64,
    pub lon: f64,
    pub radius_km: f64,
    /// Maximum number of hits returned. The total still counts every match.
    pub size: usize,
}

impl GeoDistanceQuery {
    pub fn new(lat: f64, lon: f64, radius_km: f64, size: usize) -> Self {
        Self {
            field: LOCATION_FIELD.to_string(),
            lat,
            lon,
            radius_km,
            size,
        }
    }

    /// Distance in Elasticsearch unit notation, e.g. "200km".
    pub fn distance(&self) -> String {
        format!("{}km", self.radius_km)
    }

    /// Elasticsearch search body: match-all with a `geo_distance` filter.
    pub fn to_es_body(&self) -> Value {
        let mut geo_distance = json!({
            "distance": self.distance(),
        });
        geo_distance[self.field.as_str()] = json!({ "lat": self.lat, "lon": self.lon });

        json!({
            "query": {
                "bool": {
                    "must": { "match_all": {} },
                    "filter": { "geo_distance": geo_distance }
                }
            },
            "size": self.size
        })
    }
}
