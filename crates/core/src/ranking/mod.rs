//! Candidate ranking engine.
//!
//! Pure scoring functions: candidate listings plus target metadata in,
//! ordered ranked results with score breakdowns out. No I/O, no clock,
//! no randomness - identical inputs always produce identical output.

mod scorer;
mod sidecar;
mod text;
mod types;

pub use scorer::{rank, select, QUALIFYING_THRESHOLD};
pub use sidecar::{rank_sidecar, SidecarBreakdown, SidecarRanked};
pub use types::{
    AudioFormat, BonusNote, FlagRule, RankedCandidate, RankingOptions, ScoreBreakdown,
    TargetMetadata,
};
