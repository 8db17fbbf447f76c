//! # habitat-server
//!
//! HTTP service for community maintenance issues.
//!
//! This binary provides:
//! - **Issue lifecycle** (submit, confirm, close) with role checks
//! - **Ordered listings** in three buckets: not confirmed, confirmed but
//!   open, closed
//! - **Listing cache** evicted on every write
//! - **Media storage** for the photos attached to an issue
//! - **REST API** (axum) in front of all of the above

mod access;
mod api;
mod cache;
mod clock;
mod config;
mod engine;
mod error;
mod media;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use habitat_store::Database;

use crate::access::StoreAccessResolver;
use crate::api::AppState;
use crate::cache::ListingCache;
use crate::clock::SystemClock;
use crate::config::ServerConfig;
use crate::engine::{IssueEngine, SharedDatabase, SubmissionLimits};
use crate::media::MediaStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,habitat_server=debug")),
        )
        .init();

    info!("Starting Habitat issue server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    let database = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    for (username, authority) in &config.bootstrap_authorities {
        database.upsert_authority(username, authority)?;
        info!(user = %username, authority = %authority, "Bootstrapped authority");
    }
    let db: SharedDatabase = Arc::new(Mutex::new(database));

    // Media store (creates directory if missing)
    let media = Arc::new(
        MediaStore::new(
            config.media_storage_path.clone(),
            config.media_base_url.clone(),
            config.max_image_size,
        )
        .await?,
    );

    let engine = Arc::new(IssueEngine::new(
        Arc::clone(&db),
        ListingCache::new(),
        media.clone(),
        Arc::new(SystemClock),
        SubmissionLimits {
            max_images: config.max_images_per_issue,
            upload_timeout: config.upload_timeout,
        },
    ));

    let http_addr = config.http_addr;
    let app_state = AppState {
        engine,
        media,
        access: Arc::new(StoreAccessResolver::new(db)),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
