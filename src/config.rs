use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Which document store backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Elasticsearch,
    /// In-process store, for local runs without a cluster
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: String,
    pub store: StoreKind,
    pub store_url: String,
    pub index_name: String,
    pub doc_type: String,
    /// Radius used when a search omits `range`
    pub default_radius_km: f64,
    pub max_results: usize,
    pub request_timeout_ms: u64,
    /// Reject unparsable search coordinates instead of reading them as 0
    pub strict_coordinates: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            store: StoreKind::Elasticsearch,
            store_url: "http://localhost:9200".to_string(),
            index_name: "around".to_string(),
            doc_type: "post".to_string(),
            default_radius_km: 200.0,
            max_results: 10,
            request_timeout_ms: 5000,
            strict_coordinates: false,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.default_radius_km.is_finite() && self.default_radius_km > 0.0) {
            anyhow::bail!(
                "default_radius_km must be a positive number, got {}",
                self.default_radius_km
            );
        }
        if self.max_results == 0 {
            anyhow::bail!("max_results must be at least 1");
        }
        if self.request_timeout_ms == 0 {
            anyhow::bail!("request_timeout_ms must be at least 1");
        }
        if self.index_name.is_empty() {
            anyhow::bail!("index_name must not be empty");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
