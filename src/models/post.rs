//! Post document structure for Elasticsearch indexing.

use serde::{Deserialize, Serialize};

/// Geographic point (lat/lon), stored as an Elasticsearch `geo_point`.
///
/// Ranges are not checked here; out-of-range values are left for the store to reject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// A single geo-tagged user submission.
///
/// Posts carry no id of their own: the document id is assigned on ingest and
/// lives only in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Free-text author identifier
    pub user: String,

    /// Free-text message body
    pub message: String,

    /// Where the post was made
    pub location: Location,
}
