//! Prometheus metrics for the acquisition pipeline.
//!
//! Counters and histograms only; exposition is left to the embedding
//! process.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

/// Searches executed, by outcome ("selected", "no_candidates", "error").
pub static SEARCHES_EXECUTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("shelfhound_searches_total", "Total search jobs executed"),
        &["outcome"],
    )
    .unwrap()
});

/// Candidates evaluated per search.
pub static CANDIDATES_EVALUATED: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "shelfhound_candidates_evaluated",
            "Candidates evaluated per search",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        &[],
    )
    .unwrap()
});

/// Winning candidate final scores.
pub static SELECTION_SCORE: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "shelfhound_selection_score",
            "Final score of selected candidates",
        )
        .buckets(vec![50.0, 60.0, 70.0, 80.0, 90.0, 100.0, 120.0]),
        &[],
    )
    .unwrap()
});

/// Downloads started total.
pub static DOWNLOADS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("shelfhound_downloads_started_total", "Total downloads started").unwrap()
});

/// Downloads completed total.
pub static DOWNLOADS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "shelfhound_downloads_completed_total",
        "Total downloads completed successfully",
    )
    .unwrap()
});

/// Downloads failed total.
pub static DOWNLOADS_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "shelfhound_downloads_failed_total",
        "Total downloads that failed",
    )
    .unwrap()
});

/// Organize passes, by outcome ("available", "downloaded", "error").
pub static ORGANIZES_COMPLETED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("shelfhound_organizes_total", "Total organize jobs executed"),
        &["outcome"],
    )
    .unwrap()
});

/// Job retries scheduled, by job type.
pub static JOB_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("shelfhound_job_retries_total", "Total job retries scheduled"),
        &["job_type"],
    )
    .unwrap()
});

/// Register all pipeline metrics on the given registry.
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(SEARCHES_EXECUTED.clone()))?;
    registry.register(Box::new(CANDIDATES_EVALUATED.clone()))?;
    registry.register(Box::new(SELECTION_SCORE.clone()))?;
    registry.register(Box::new(DOWNLOADS_STARTED.clone()))?;
    registry.register(Box::new(DOWNLOADS_COMPLETED.clone()))?;
    registry.register(Box::new(DOWNLOADS_FAILED.clone()))?;
    registry.register(Box::new(ORGANIZES_COMPLETED.clone()))?;
    registry.register(Box::new(JOB_RETRIES.clone()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        let registry = Registry::new();
        register_metrics(&registry).unwrap();

        SEARCHES_EXECUTED.with_label_values(&["selected"]).inc();
        DOWNLOADS_STARTED.inc();

        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "shelfhound_searches_total"));
    }
}
