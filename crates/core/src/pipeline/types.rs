//! Pipeline runtime types.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::{Config, PathMapConfig, SidecarSourceConfig};
use crate::ranking::RankingOptions;

/// Errors a processor can surface to the worker.
///
/// Anything returned here rides the job's own retry ladder. Expected domain
/// outcomes (no candidates, configuration problems, exhausted download
/// locations) are not errors: processors record them on the request and
/// complete the job.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("{0}")]
    Transient(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Queue error: {0}")]
    Queue(String),
}

/// Outcome of the search step.
///
/// One explicit variant per branch keeps the handling exhaustive: absence
/// of results is success-with-parking, configuration problems fail the
/// request without burning job attempts, and only transient external
/// errors reach the retry ladder.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SearchOutcome {
    Selected {
        history_id: String,
        title: String,
        source: String,
        base_score: f32,
        final_score: f32,
        candidates_evaluated: u32,
    },
    NoQualifyingCandidate {
        evaluated: u32,
        reason: String,
    },
    TransientError {
        error: String,
    },
    FatalError {
        error: String,
    },
}

/// Configuration slice the processors need at runtime, decoded once.
#[derive(Debug, Clone)]
pub struct PipelineRuntime {
    /// Default retry budget for jobs the pipeline enqueues.
    pub default_max_attempts: u32,
    /// Delay between download progress polls.
    pub monitor_poll: Duration,
    /// Ranking options for primary searches.
    pub ranking: RankingOptions,
    /// Trust scores for sidecar ranking, by source name.
    pub sidecar_trust: HashMap<String, u8>,
    /// Enabled sidecar sources, in config order.
    pub sidecar_sources: Vec<SidecarSourceConfig>,
    /// Library root; `None` means organized requests finish as downloaded.
    pub library_root: Option<PathBuf>,
    /// Destination template under the library root.
    pub dest_template: String,
    /// Download-client path translation.
    pub path_map: PathMapConfig,
}

impl PipelineRuntime {
    /// Assemble the runtime slice from the full configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut source_priorities = HashMap::new();
        if let Some(ref indexer) = config.indexer {
            for source in &indexer.sources {
                source_priorities.insert(source.name.clone(), source.priority);
            }
        }

        let mut sidecar_trust = HashMap::new();
        let mut sidecar_sources = Vec::new();
        if let Some(ref fetcher) = config.fetcher {
            for source in &fetcher.sources {
                sidecar_trust.insert(source.name.clone(), source.trust);
                if source.enabled {
                    sidecar_sources.push(source.clone());
                }
            }
        }

        Self {
            default_max_attempts: config.pipeline.default_max_attempts,
            monitor_poll: Duration::from_secs(config.pipeline.monitor_poll_secs),
            ranking: RankingOptions {
                source_priorities,
                flag_rules: config.ranking.flag_rules.clone(),
            },
            sidecar_trust,
            sidecar_sources,
            library_root: config.library.root.clone(),
            dest_template: config.library.dest_template.clone(),
            path_map: config.library.path_map.clone(),
        }
    }
}
