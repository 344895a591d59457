use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ranking::FlagRule;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub indexer: Option<IndexerConfig>,
    #[serde(default)]
    pub fetcher: Option<FetcherConfig>,
    #[serde(default)]
    pub download_client: Option<DownloadClientConfig>,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub library: LibraryConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("shelfhound.db")
}

/// Pipeline (job worker) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Enable/disable the background worker pool.
    /// When disabled, jobs stay queued until processed by another instance.
    #[serde(default)]
    pub enabled: bool,

    /// Number of concurrent job workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// How often an idle worker polls the queue (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Default retry budget for enqueued jobs.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,

    /// Base delay before a failed job is retried (seconds).
    /// The actual delay grows with the attempt count.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,

    /// Delay between download progress polls (seconds).
    #[serde(default = "default_monitor_poll")]
    pub monitor_poll_secs: u64,

    /// How long a request sits in awaiting-search before the sweeper
    /// schedules a fresh search (minutes).
    #[serde(default = "default_research_interval")]
    pub research_interval_mins: u64,

    /// How often the sweeper scans for awaiting-search requests (seconds).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_worker_count() -> usize {
    2
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    30
}

fn default_monitor_poll() -> u64 {
    5
}

fn default_research_interval() -> u64 {
    360
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            worker_count: default_worker_count(),
            poll_interval_ms: default_poll_interval(),
            default_max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff(),
            monitor_poll_secs: default_monitor_poll(),
            research_interval_mins: default_research_interval(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Search indexer (aggregator) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerConfig {
    /// Aggregator base URL (e.g., "http://localhost:9117").
    pub url: String,
    /// Aggregator API key.
    pub api_key: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Maximum response body size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,
    /// Minimum availability (seeders) a result must report to be returned.
    #[serde(default = "default_min_availability")]
    pub min_availability: u32,
    /// Maximum results requested per source.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Configured sources behind the aggregator.
    #[serde(default)]
    pub sources: Vec<IndexerSourceConfig>,
}

fn default_timeout() -> u32 {
    30
}

fn default_max_response_bytes() -> u64 {
    4 * 1024 * 1024
}

fn default_min_availability() -> u32 {
    1
}

fn default_max_results() -> u32 {
    100
}

/// A single search source behind the aggregator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerSourceConfig {
    /// Source name/ID as known to the aggregator.
    pub name: String,
    /// Whether this source is queried.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Scoring priority weight (bonus points, may be negative).
    #[serde(default)]
    pub priority: i32,
}

fn default_true() -> bool {
    true
}

/// Direct-fetch (sidecar e-book) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Maximum response body size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,
    /// Configured sidecar sources.
    #[serde(default)]
    pub sources: Vec<SidecarSourceConfig>,
}

/// A single direct-fetch source for companion e-books.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SidecarSourceConfig {
    /// Source name (used as the fetcher identity).
    pub name: String,
    /// Source base URL.
    pub url: String,
    /// API key, if the source requires one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Whether sidecar searches are spawned against this source.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fixed trust score for sidecar ranking (0-30).
    #[serde(default = "default_trust")]
    pub trust: u8,
    /// Format requested from this source.
    #[serde(default = "default_sidecar_format")]
    pub preferred_format: String,
}

fn default_trust() -> u8 {
    15
}

fn default_sidecar_format() -> String {
    "epub".to_string()
}

/// Download client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadClientConfig {
    /// Download client base URL.
    pub url: String,
    /// Download client API key.
    pub api_key: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Category tag applied to downloads started by the pipeline.
    #[serde(default = "default_download_category")]
    pub category: String,
}

fn default_download_category() -> String {
    "shelfhound".to_string()
}

/// Ranking configuration (bonus flag rules).
///
/// Source priorities live on [`IndexerSourceConfig`]; trust scores live on
/// [`SidecarSourceConfig`]. This section only carries the flag rules.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RankingConfig {
    /// Positive/negative text predicates applied after base scoring.
    #[serde(default)]
    pub flag_rules: Vec<FlagRule>,
}

/// Library placement configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Library root. When unset, organized requests finish as `downloaded`
    /// and files stay where the download client left them.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Destination template under the root. Supports `{author}` and `{title}`.
    #[serde(default = "default_dest_template")]
    pub dest_template: String,
    /// Remote-to-local path translation for download client paths.
    #[serde(default)]
    pub path_map: PathMapConfig,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: None,
            dest_template: default_dest_template(),
            path_map: PathMapConfig::default(),
        }
    }
}

fn default_dest_template() -> String {
    "{author}/{title}".to_string()
}

/// Path translation between the download client's filesystem and ours.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PathMapConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub remote_prefix: String,
    #[serde(default)]
    pub local_prefix: String,
}

impl Config {
    /// Enabled indexer source names, in config order.
    pub fn enabled_sources(&self) -> Vec<String> {
        self.indexer
            .as_ref()
            .map(|i| {
                i.sources
                    .iter()
                    .filter(|s| s.enabled)
                    .map(|s| s.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Enabled sidecar source configs, in config order.
    pub fn enabled_sidecar_sources(&self) -> Vec<&SidecarSourceConfig> {
        self.fetcher
            .as_ref()
            .map(|f| f.sources.iter().filter(|s| s.enabled).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.default_max_attempts, 3);
        assert_eq!(config.retry_backoff_secs, 30);
    }

    #[test]
    fn test_deserialize_minimal_pipeline() {
        let toml = r#"
            enabled = true
        "#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert!(config.enabled);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.research_interval_mins, 360);
    }

    #[test]
    fn test_deserialize_indexer_with_sources() {
        let toml = r#"
            url = "http://localhost:9117"
            api_key = "secret"

            [[sources]]
            name = "audiobay"
            priority = 10

            [[sources]]
            name = "flaky-source"
            enabled = false
            priority = -5
        "#;
        let config: IndexerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.sources.len(), 2);
        assert!(config.sources[0].enabled);
        assert_eq!(config.sources[0].priority, 10);
        assert!(!config.sources[1].enabled);
        assert_eq!(config.sources[1].priority, -5);
    }

    #[test]
    fn test_enabled_sources_skips_disabled() {
        let config = Config {
            database: DatabaseConfig::default(),
            pipeline: PipelineConfig::default(),
            indexer: Some(IndexerConfig {
                url: "http://localhost:9117".to_string(),
                api_key: "k".to_string(),
                timeout_secs: 30,
                max_response_bytes: default_max_response_bytes(),
                min_availability: 1,
                max_results: 100,
                sources: vec![
                    IndexerSourceConfig {
                        name: "a".to_string(),
                        enabled: true,
                        priority: 0,
                    },
                    IndexerSourceConfig {
                        name: "b".to_string(),
                        enabled: false,
                        priority: 0,
                    },
                ],
            }),
            fetcher: None,
            download_client: None,
            ranking: RankingConfig::default(),
            library: LibraryConfig::default(),
        };
        assert_eq!(config.enabled_sources(), vec!["a".to_string()]);
        assert!(config.enabled_sidecar_sources().is_empty());
    }

    #[test]
    fn test_sidecar_source_defaults() {
        let toml = r#"
            name = "openbooks"
            url = "http://localhost:8585"
        "#;
        let source: SidecarSourceConfig = toml::from_str(toml).unwrap();
        assert!(source.enabled);
        assert_eq!(source.trust, 15);
        assert_eq!(source.preferred_format, "epub");
        assert!(source.api_key.is_none());
    }

    #[test]
    fn test_library_defaults() {
        let config = LibraryConfig::default();
        assert!(config.root.is_none());
        assert_eq!(config.dest_template, "{author}/{title}");
        assert!(!config.path_map.enabled);
    }
}
