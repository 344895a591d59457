use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelfhound_core::config::SidecarSourceConfig;
use shelfhound_core::downloader::DownloadClient;
use shelfhound_core::events::{create_event_system, EventStore, PipelineEvent, SqliteEventStore};
use shelfhound_core::fetcher::{DirectFetcher, HttpFetcher};
use shelfhound_core::history::{HistoryStore, SqliteHistoryStore};
use shelfhound_core::indexer::{SearchIndexer, TorznabIndexer};
use shelfhound_core::jobs::{JobQueue, SqliteJobQueue};
use shelfhound_core::metrics::register_metrics;
use shelfhound_core::pipeline::{PipelineRuntime, Processors, WorkerPool};
use shelfhound_core::request::{RequestStore, SqliteRequestStore};
use shelfhound_core::{load_config, validate_config, HttpDownloadClient};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for the pipeline event channel
const EVENT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("SHELFHOUND_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);

    // Compute config hash for the event log
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Metrics registry
    let registry = prometheus::Registry::new();
    register_metrics(&registry).context("Failed to register metrics")?;

    // Stores
    let request_store: Arc<dyn RequestStore> = Arc::new(
        SqliteRequestStore::new(&config.database.path)
            .context("Failed to create request store")?,
    );
    info!("Request store initialized");

    let job_queue: Arc<dyn JobQueue> = Arc::new(
        SqliteJobQueue::new(&config.database.path)
            .context("Failed to create job queue")?
            .with_retry_backoff(std::time::Duration::from_secs(
                config.pipeline.retry_backoff_secs,
            )),
    );
    info!("Job queue initialized");

    let history_store: Arc<dyn HistoryStore> = Arc::new(
        SqliteHistoryStore::new(&config.database.path)
            .context("Failed to create history store")?,
    );
    info!("History store initialized");

    let event_store: Arc<dyn EventStore> = Arc::new(
        SqliteEventStore::new(&config.database.path).context("Failed to create event store")?,
    );
    info!("Event store initialized");

    // Event system
    let (event_handle, event_writer) = create_event_system(event_store, EVENT_BUFFER_SIZE);
    let writer_handle = tokio::spawn(event_writer.run());

    event_handle
        .emit(PipelineEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    // External clients
    let indexer: Option<Arc<dyn SearchIndexer>> = match &config.indexer {
        Some(indexer_config) => {
            info!("Initializing search indexer at {}", indexer_config.url);
            Some(Arc::new(
                TorznabIndexer::new(indexer_config.clone())
                    .context("Failed to create search indexer")?,
            ))
        }
        None => {
            info!("No search indexer configured");
            None
        }
    };

    let download_client: Option<Arc<dyn DownloadClient>> = match &config.download_client {
        Some(client_config) => {
            info!("Initializing download client at {}", client_config.url);
            Some(Arc::new(
                HttpDownloadClient::new(client_config.clone())
                    .context("Failed to create download client")?,
            ))
        }
        None => {
            info!("No download client configured");
            None
        }
    };

    let fetchers: Vec<Arc<dyn DirectFetcher>> = match &config.fetcher {
        Some(fetcher_config) => {
            let sources: Vec<&SidecarSourceConfig> = fetcher_config
                .sources
                .iter()
                .filter(|s| s.enabled)
                .collect();
            let mut fetchers: Vec<Arc<dyn DirectFetcher>> = Vec::with_capacity(sources.len());
            for source in sources {
                info!("Initializing sidecar source '{}'", source.name);
                fetchers.push(Arc::new(
                    HttpFetcher::new(
                        source.clone(),
                        fetcher_config.timeout_secs,
                        fetcher_config.max_response_bytes,
                    )
                    .with_context(|| format!("Failed to create fetcher '{}'", source.name))?,
                ));
            }
            fetchers
        }
        None => Vec::new(),
    };

    // Pipeline
    let runtime = PipelineRuntime::from_config(&config);
    let processors = Arc::new(Processors::new(
        runtime,
        Arc::clone(&request_store),
        Arc::clone(&job_queue),
        history_store,
        indexer,
        fetchers,
        download_client,
        Some(event_handle.clone()),
    ));

    let pool = WorkerPool::new(
        config.pipeline.clone(),
        processors,
        Arc::clone(&job_queue),
        Arc::clone(&request_store),
        Some(event_handle.clone()),
    );

    if config.pipeline.enabled {
        pool.start();
    } else {
        info!("Pipeline disabled; jobs will stay queued");
    }

    info!("shelfhound {} running, press ctrl-c to stop", VERSION);

    // Wait for shutdown signal
    signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    info!("Shutdown signal received");

    pool.stop().await;

    event_handle
        .emit(PipelineEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // Drop every handle holder so the writer drains and exits
    drop(pool);
    drop(event_handle);
    if let Err(e) = writer_handle.await {
        error!("Event writer did not shut down cleanly: {}", e);
    }

    info!("Goodbye");
    Ok(())
}
