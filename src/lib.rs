//! Around - geo-tagged posts backed by Elasticsearch
//!
//! This library provides the store adapter, index bootstrap and HTTP handlers
//! used by the `around` server binary.

pub mod api;
pub mod config;
pub mod elasticsearch;
pub mod error;
pub mod models;
pub mod query;
pub mod schema;
pub mod store;

pub use config::{Config, StoreKind};
pub use error::{ApiError, StoreError};
pub use models::{Location, Post};
