//! Sidecar ranking: a simplified three-factor variant used when a single
//! source type (direct-fetch e-book editions) is evaluated.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::fetcher::ContentHandle;

const FORMAT_MAX: f32 = 40.0;
const SIZE_MAX: f32 = 30.0;
const TRUST_MAX: f32 = 30.0;

/// Per-factor contributions for one sidecar candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SidecarBreakdown {
    /// Format match points (0-40).
    pub format: f32,
    /// Inverse size points (0-30), smaller preferred.
    pub size: f32,
    /// Fixed per-source trust points (0-30).
    pub trust: f32,
    /// Free-text notes.
    pub notes: Vec<String>,
}

/// A sidecar candidate plus its computed score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarRanked {
    pub handle: ContentHandle,
    pub score: f32,
    pub breakdown: SidecarBreakdown,
    /// Position in the input slice; preserved for stable tie-breaking.
    pub input_order: usize,
}

/// Score and order sidecar content handles.
///
/// Deterministic and pure, like [`super::rank`]: format match 40 points,
/// inverse size 30 (relative to the smallest known size in the pass),
/// fixed per-source trust 30.
pub fn rank_sidecar(
    handles: &[ContentHandle],
    preferred_format: &str,
    source_trust: &HashMap<String, u8>,
) -> Vec<SidecarRanked> {
    // Smallest known size in the pass anchors the inverse size factor
    let min_size = handles
        .iter()
        .filter_map(|h| h.size_bytes)
        .filter(|s| *s > 0)
        .min();

    let mut ranked: Vec<SidecarRanked> = handles
        .iter()
        .enumerate()
        .map(|(idx, handle)| {
            let mut notes = Vec::new();

            let format = if handle.format.eq_ignore_ascii_case(preferred_format) {
                FORMAT_MAX
            } else if handle.format.is_empty() {
                notes.push("format unknown".to_string());
                0.0
            } else {
                notes.push(format!(
                    "format {} differs from preferred {}",
                    handle.format, preferred_format
                ));
                FORMAT_MAX * 0.25
            };

            let size = match (handle.size_bytes.filter(|s| *s > 0), min_size) {
                (Some(size), Some(min)) => SIZE_MAX * (min as f32 / size as f32),
                _ => {
                    notes.push("size unknown, neutral size score".to_string());
                    SIZE_MAX * 0.5
                }
            };

            let trust = source_trust
                .get(&handle.source)
                .map(|t| (*t as f32).min(TRUST_MAX))
                .unwrap_or_else(|| {
                    notes.push(format!("no trust configured for {}", handle.source));
                    0.0
                });

            SidecarRanked {
                handle: handle.clone(),
                score: format + size + trust,
                breakdown: SidecarBreakdown {
                    format,
                    size,
                    trust,
                    notes,
                },
                input_order: idx,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.input_order.cmp(&b.input_order))
    });

    ranked
}
