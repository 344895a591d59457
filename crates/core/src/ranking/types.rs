//! Ranking input and output types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::indexer::CandidateResult;

/// Target metadata a candidate is scored against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetMetadata {
    /// Title of the wanted work.
    pub title: String,
    /// Author(s), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Runtime in minutes, when known. Drives the size stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

impl TargetMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: None,
            duration_minutes: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_duration_minutes(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }
}

/// A configurable bonus/penalty rule: substring predicate plus point delta.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlagRule {
    /// Rule name, used in breakdown notes.
    pub name: String,
    /// Case-insensitive substring matched against the candidate title.
    pub pattern: String,
    /// Point delta applied when the pattern matches (may be negative).
    pub points: i32,
}

/// Runtime options for a ranking pass, assembled once from config.
#[derive(Debug, Clone, Default)]
pub struct RankingOptions {
    /// Per-source priority weight added as bonus points.
    pub source_priorities: HashMap<String, i32>,
    /// Flag rules applied after base scoring.
    pub flag_rules: Vec<FlagRule>,
}

/// Detected audio container/codec, mapped to a fixed quality tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// Chaptered audiobook container.
    M4b,
    M4a,
    Flac,
    Ogg,
    Aac,
    Mp3,
}

impl AudioFormat {
    /// Fixed format-quality points (0-25).
    pub fn quality_points(&self) -> f32 {
        match self {
            AudioFormat::M4b => 25.0,
            AudioFormat::M4a => 21.0,
            AudioFormat::Flac => 18.0,
            AudioFormat::Ogg => 14.0,
            AudioFormat::Aac => 12.0,
            AudioFormat::Mp3 => 10.0,
        }
    }

    /// Detect a format from free text (a format hint or a listing title).
    pub fn detect(text: &str) -> Option<AudioFormat> {
        let lower = text.to_lowercase();
        let has = |needle: &str| {
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|tok| tok == needle)
        };
        if has("m4b") {
            Some(AudioFormat::M4b)
        } else if has("m4a") {
            Some(AudioFormat::M4a)
        } else if has("flac") {
            Some(AudioFormat::Flac)
        } else if has("ogg") || has("opus") {
            Some(AudioFormat::Ogg)
        } else if has("aac") {
            Some(AudioFormat::Aac)
        } else if has("mp3") {
            Some(AudioFormat::Mp3)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::M4b => "m4b",
            AudioFormat::M4a => "m4a",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Aac => "aac",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

/// One applied bonus modifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BonusNote {
    pub name: String,
    pub points: f32,
}

/// Per-stage score contributions for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    /// Fraction of significant target title words found in the candidate.
    pub coverage: f32,
    /// Whether the coverage gate passed.
    pub coverage_passed: bool,
    /// Title stage points (0-35).
    pub title: f32,
    /// Author stage points (0-15).
    pub author: f32,
    /// Format stage points (0-25).
    pub format: f32,
    /// Availability stage points (0-15).
    pub availability: f32,
    /// Size stage points (0-10).
    pub size: f32,
    /// Applied bonus modifiers.
    pub bonuses: Vec<BonusNote>,
    /// Free-text notes about how the stages were decided.
    pub notes: Vec<String>,
}

/// A candidate plus its computed scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: CandidateResult,
    /// Combined stage score (0-100); forced to 0 by a failed coverage gate.
    pub base_score: f32,
    /// Sum of source priority and flag rule deltas.
    pub bonus_points: f32,
    /// `base_score + bonus_points`.
    pub final_score: f32,
    pub breakdown: ScoreBreakdown,
    /// Position in the input slice; preserved for stable tie-breaking.
    pub input_order: usize,
}

impl RankedCandidate {
    /// A candidate qualifies only when both base and final score clear the
    /// threshold; a well-matched listing dragged under by penalties is
    /// disqualified distinctly from one that never matched.
    pub fn qualifies(&self) -> bool {
        self.base_score >= super::QUALIFYING_THRESHOLD
            && self.final_score >= super::QUALIFYING_THRESHOLD
    }
}
