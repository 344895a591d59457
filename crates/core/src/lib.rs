pub mod config;
pub mod downloader;
pub mod events;
pub mod fetcher;
pub mod history;
pub mod indexer;
pub mod jobs;
pub mod metrics;
pub mod organizer;
pub mod pipeline;
pub mod ranking;
pub mod request;
pub mod testing;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use downloader::{DownloadClient, DownloadClientError, DownloadState, HttpDownloadClient};
pub use events::{
    create_event_system, EventHandle, EventStore, PipelineEvent, SqliteEventStore,
};
pub use fetcher::{DirectFetcher, FetchError, HttpFetcher};
pub use history::{HistoryStore, SqliteHistoryStore};
pub use indexer::{IndexerError, SearchIndexer, TorznabIndexer};
pub use jobs::{Job, JobPayload, JobQueue, JobStatus, JobType, SqliteJobQueue};
pub use pipeline::{PipelineRuntime, Processors, WorkerPool};
pub use ranking::{rank, rank_sidecar, select, RankingOptions, TargetMetadata};
pub use request::{
    AcquisitionRequest, CreateRequest, RequestKind, RequestStatus, RequestStore,
    SqliteRequestStore,
};
