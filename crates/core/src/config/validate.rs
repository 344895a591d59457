use super::{types::Config, ConfigError};

/// Validate configuration
///
/// Checks the cross-field constraints serde cannot express:
/// - the pipeline needs an indexer and a download client when enabled
/// - an enabled indexer needs at least one enabled source
/// - worker count and timeouts must be non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.pipeline.enabled {
        if config.indexer.is_none() {
            return Err(ConfigError::ValidationError(
                "pipeline is enabled but no [indexer] is configured".to_string(),
            ));
        }
        if config.download_client.is_none() {
            return Err(ConfigError::ValidationError(
                "pipeline is enabled but no [download_client] is configured".to_string(),
            ));
        }
        if config.pipeline.worker_count == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.worker_count cannot be 0".to_string(),
            ));
        }
    }

    if let Some(ref indexer) = config.indexer {
        if indexer.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "indexer.url cannot be empty".to_string(),
            ));
        }
        if indexer.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "indexer.timeout_secs cannot be 0".to_string(),
            ));
        }
        if config.pipeline.enabled && !indexer.sources.iter().any(|s| s.enabled) {
            return Err(ConfigError::ValidationError(
                "pipeline is enabled but no indexer source is enabled".to_string(),
            ));
        }
    }

    if let Some(ref client) = config.download_client {
        if client.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "download_client.url cannot be empty".to_string(),
            ));
        }
        if client.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "download_client.timeout_secs cannot be 0".to_string(),
            ));
        }
    }

    if let Some(ref fetcher) = config.fetcher {
        for source in &fetcher.sources {
            if source.url.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "fetcher source '{}' has an empty url",
                    source.name
                )));
            }
            if source.trust > 30 {
                return Err(ConfigError::ValidationError(format!(
                    "fetcher source '{}' trust must be 0-30",
                    source.name
                )));
            }
        }
    }

    if config.library.path_map.enabled {
        let map = &config.library.path_map;
        if map.remote_prefix.is_empty() || map.local_prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "library.path_map is enabled but a prefix is empty".to_string(),
            ));
        }
    }

    Ok(())
}
