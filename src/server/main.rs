//! HTTP server for geo-tagged posts.
//!
//! Ensures the post index exists, then serves `POST /post` and `GET /search`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use around::api::{router, AppState};
use around::elasticsearch::EsStore;
use around::schema::ensure_index;
use around::store::{DocumentStore, MemoryStore};
use around::{Config, StoreKind};

#[derive(Parser, Debug)]
#[command(name = "around")]
#[command(about = "Geo-tagged post service")]
struct Args {
    /// TOML config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Document store backend
    #[arg(long, value_enum)]
    store: Option<StoreKind>,

    /// Elasticsearch URL
    #[arg(long, env = "AROUND_ES_URL")]
    es_url: Option<String>,

    /// Elasticsearch index name
    #[arg(long)]
    index: Option<String>,

    /// Document type recorded for posts
    #[arg(long)]
    doc_type: Option<String>,

    /// Search radius in km when the request has no `range`
    #[arg(long)]
    default_radius_km: Option<f64>,

    /// Maximum number of posts returned per search
    #[arg(long)]
    max_results: Option<usize>,

    /// Per-request timeout for store round trips
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// Reject unparsable search coordinates with 400 instead of reading them as 0
    #[arg(long)]
    strict_coordinates: Option<bool>,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(store) = self.store {
            config.store = store;
        }
        if let Some(es_url) = self.es_url {
            config.store_url = es_url;
        }
        if let Some(index) = self.index {
            config.index_name = index;
        }
        if let Some(doc_type) = self.doc_type {
            config.doc_type = doc_type;
        }
        if let Some(radius) = self.default_radius_km {
            config.default_radius_km = radius;
        }
        if let Some(max_results) = self.max_results {
            config.max_results = max_results;
        }
        if let Some(timeout) = self.request_timeout_ms {
            config.request_timeout_ms = timeout;
        }
        if let Some(strict) = self.strict_coordinates {
            config.strict_coordinates = strict;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Args::parse().into_config()?;

    info!("Around post service");

    let store: Arc<dyn DocumentStore> = match config.store {
        StoreKind::Elasticsearch => {
            info!("Connecting to Elasticsearch at {}", config.store_url);
            Arc::new(
                EsStore::new(&config.store_url, config.request_timeout())
                    .context("Failed to connect to Elasticsearch")?,
            )
        }
        StoreKind::Memory => {
            info!("Using in-memory document store");
            Arc::new(MemoryStore::new())
        }
    };

    // The geo_point mapping must be in place before any post is written
    ensure_index(store.as_ref(), &config.index_name, &config.doc_type)
        .await
        .with_context(|| format!("Failed to bootstrap index {}", config.index_name))?;

    let listen = config.listen.clone();
    let app = router(Arc::new(AppState::new(store, config)));

    info!("Starting server on {}", listen);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
