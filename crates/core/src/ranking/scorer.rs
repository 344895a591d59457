//! Primary ranking: staged scoring with a coverage gate and dual thresholds.

use crate::indexer::CandidateResult;

use super::text::{normalize, significant_words, similarity, starts_with_boundary, words};
use super::types::{
    AudioFormat, BonusNote, RankedCandidate, RankingOptions, ScoreBreakdown, TargetMetadata,
};

/// Both base and final score must reach this for a candidate to qualify.
pub const QUALIFYING_THRESHOLD: f32 = 50.0;

/// Minimum fraction of significant target title words that must appear in
/// the candidate title before any score is awarded.
const COVERAGE_GATE: f32 = 0.8;

const TITLE_MAX: f32 = 35.0;
const AUTHOR_MAX: f32 = 15.0;
const AVAILABILITY_MAX: f32 = 15.0;
const SIZE_MAX: f32 = 10.0;

/// Format-quality points when no container/codec could be detected.
/// Sits between the lossless and lossy tiers, mirroring the neutral
/// mid-score the size stage uses for unknown duration.
const UNKNOWN_FORMAT_POINTS: f32 = 12.0;

/// Expected audiobook bytes-per-minute band for the size stage.
const BYTES_PER_MIN_LOW: f32 = 300.0 * 1024.0;
const BYTES_PER_MIN_HIGH: f32 = 3.0 * 1024.0 * 1024.0;

/// Score and order candidates against the target.
///
/// Qualifying candidates come first, descending by final score; ties break
/// on base score, then on input order. Disqualified candidates follow in
/// the same ordering so callers can report why nothing was picked.
pub fn rank(
    candidates: &[CandidateResult],
    target: &TargetMetadata,
    options: &RankingOptions,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .iter()
        .enumerate()
        .map(|(idx, c)| score_candidate(c, target, options, idx))
        .collect();

    ranked.sort_by(|a, b| {
        b.qualifies()
            .cmp(&a.qualifies())
            .then(b.final_score.total_cmp(&a.final_score))
            .then(b.base_score.total_cmp(&a.base_score))
            .then(a.input_order.cmp(&b.input_order))
    });

    ranked
}

/// The winning candidate of a ranking pass, if any qualified.
pub fn select(ranked: &[RankedCandidate]) -> Option<&RankedCandidate> {
    ranked.first().filter(|r| r.qualifies())
}

fn score_candidate(
    candidate: &CandidateResult,
    target: &TargetMetadata,
    options: &RankingOptions,
    input_order: usize,
) -> RankedCandidate {
    let mut notes = Vec::new();

    let (coverage, coverage_passed) = coverage(&candidate.title, &target.title);

    let (title, author, format, availability, size) = if coverage_passed {
        let (title, title_note) = title_score(&candidate.title, &target.title);
        if let Some(note) = title_note {
            notes.push(note);
        }

        let (author, author_note) = author_score(&candidate.title, target.author.as_deref());
        if let Some(note) = author_note {
            notes.push(note);
        }

        let (format, format_note) = format_score(candidate);
        notes.push(format_note);

        let availability = availability_score(candidate.seeders);
        if candidate.seeders == 0 {
            notes.push("no availability".to_string());
        }

        let (size, size_note) = size_score(candidate.size_bytes, target.duration_minutes);
        if let Some(note) = size_note {
            notes.push(note);
        }

        (title, author, format, availability, size)
    } else {
        notes.push(format!(
            "coverage {:.0}% below {:.0}% gate",
            coverage * 100.0,
            COVERAGE_GATE * 100.0
        ));
        (0.0, 0.0, 0.0, 0.0, 0.0)
    };

    let base_score = if coverage_passed {
        title + author + format + availability + size
    } else {
        0.0
    };

    let (bonus_points, bonuses) = bonus_points(candidate, options);
    let final_score = base_score + bonus_points;

    RankedCandidate {
        candidate: candidate.clone(),
        base_score,
        bonus_points,
        final_score,
        breakdown: ScoreBreakdown {
            coverage,
            coverage_passed,
            title,
            author,
            format,
            availability,
            size,
            bonuses,
            notes,
        },
        input_order,
    }
}

/// Coverage gate: fraction of significant target title words present in the
/// candidate title.
fn coverage(candidate_title: &str, target_title: &str) -> (f32, bool) {
    let target_words = significant_words(target_title);
    if target_words.is_empty() {
        return (1.0, true);
    }

    let candidate_words: std::collections::HashSet<String> =
        words(candidate_title).into_iter().collect();

    let matched = target_words
        .iter()
        .filter(|w| candidate_words.contains(*w))
        .count();

    let coverage = matched as f32 / target_words.len() as f32;
    (coverage, coverage >= COVERAGE_GATE)
}

/// Title stage (0-35).
fn title_score(candidate_title: &str, target_title: &str) -> (f32, Option<String>) {
    let candidate = normalize(candidate_title);
    let target = normalize(target_title);

    if target.is_empty() {
        return (0.0, Some("empty target title".to_string()));
    }

    if let Some(rest) = candidate.strip_prefix(&target) {
        if starts_with_boundary(rest) {
            // Full title followed by a metadata boundary marker
            return (TITLE_MAX, None);
        }
        // Full title present but the candidate keeps going with more words:
        // partial credit, floored because the whole target was found
        let sim = similarity(&candidate, &target).max(0.5);
        return (
            TITLE_MAX * sim,
            Some("title is a strict prefix of the candidate".to_string()),
        );
    }

    let sim = similarity(&candidate, &target);
    (TITLE_MAX * sim, Some("fuzzy title similarity".to_string()))
}

/// Author stage (0-15). The candidate has no separate author field, so the
/// target author tokens are matched against the listing title.
fn author_score(candidate_title: &str, target_author: Option<&str>) -> (f32, Option<String>) {
    let author = match target_author {
        Some(a) if !a.trim().is_empty() => a,
        _ => {
            return (
                AUTHOR_MAX * 0.5,
                Some("no target author, neutral author score".to_string()),
            )
        }
    };

    let parts = split_authors(author);
    if parts.is_empty() {
        return (
            AUTHOR_MAX * 0.5,
            Some("only role qualifiers in author, neutral author score".to_string()),
        );
    }

    let candidate = candidate_title.to_lowercase();
    let matched = parts
        .iter()
        .filter(|p| candidate.contains(p.as_str()))
        .count();

    if matched > 0 {
        let score = AUTHOR_MAX * matched as f32 / parts.len() as f32;
        return (score, None);
    }

    // No exact containment; fall back to the best word-pair similarity
    let candidate_words = words(candidate_title);
    let mut best = 0.0f32;
    for part in &parts {
        for part_word in words(part) {
            for cand_word in &candidate_words {
                best = best.max(similarity(&part_word, cand_word));
            }
        }
    }

    (
        AUTHOR_MAX * best,
        Some("fuzzy author similarity".to_string()),
    )
}

/// Split an author string on common delimiters and drop role qualifiers.
fn split_authors(author: &str) -> Vec<String> {
    let lower = author.to_lowercase();
    let unified = lower
        .replace('&', ",")
        .replace(';', ",")
        .replace(" and ", ",")
        .replace(" - ", ",");

    unified
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter(|p| !is_role_qualifier(p))
        .map(str::to_string)
        .collect()
}

fn is_role_qualifier(part: &str) -> bool {
    const QUALIFIERS: &[&str] = &[
        "narrat",
        "translat",
        "read by",
        "reader",
        "editor",
        "illustrat",
        "foreword",
        "introduc",
    ];
    QUALIFIERS.iter().any(|q| part.contains(q))
}

/// Format stage (0-25): fixed tier lookup from the format hint, falling back
/// to tokens in the title.
fn format_score(candidate: &CandidateResult) -> (f32, String) {
    let detected = candidate
        .format_hint
        .as_deref()
        .and_then(AudioFormat::detect)
        .or_else(|| AudioFormat::detect(&candidate.title));

    match detected {
        Some(format) => (format.quality_points(), format!("format {}", format.as_str())),
        None => (UNKNOWN_FORMAT_POINTS, "format undetected".to_string()),
    }
}

/// Availability stage (0-15): logarithmic in the seed count so extra
/// seeders have diminishing value.
fn availability_score(seeders: u32) -> f32 {
    (((seeders as f32) + 1.0).log10() * 6.0).min(AVAILABILITY_MAX)
}

/// Size stage (0-10): scored against the expected bytes-per-minute band
/// when the target duration is known; neutral otherwise.
fn size_score(size_bytes: u64, duration_minutes: Option<u32>) -> (f32, Option<String>) {
    let minutes = match duration_minutes {
        Some(m) if m > 0 => m,
        _ => {
            return (
                SIZE_MAX * 0.5,
                Some("unknown duration, neutral size score".to_string()),
            )
        }
    };

    if size_bytes == 0 {
        return (0.0, Some("zero reported size".to_string()));
    }

    let bytes_per_min = size_bytes as f32 / minutes as f32;
    if bytes_per_min < BYTES_PER_MIN_LOW {
        (
            SIZE_MAX * (bytes_per_min / BYTES_PER_MIN_LOW),
            Some("smaller than expected for duration".to_string()),
        )
    } else if bytes_per_min > BYTES_PER_MIN_HIGH {
        (
            SIZE_MAX * (BYTES_PER_MIN_HIGH / bytes_per_min),
            Some("larger than expected for duration".to_string()),
        )
    } else {
        (SIZE_MAX, None)
    }
}

/// Bonus modifiers: source priority weight plus matching flag rules.
fn bonus_points(candidate: &CandidateResult, options: &RankingOptions) -> (f32, Vec<BonusNote>) {
    let mut total = 0.0f32;
    let mut bonuses = Vec::new();

    if let Some(priority) = options.source_priorities.get(&candidate.source) {
        if *priority != 0 {
            total += *priority as f32;
            bonuses.push(BonusNote {
                name: format!("source priority {}", candidate.source),
                points: *priority as f32,
            });
        }
    }

    let title = candidate.title.to_lowercase();
    for rule in &options.flag_rules {
        if title.contains(&rule.pattern.to_lowercase()) {
            total += rule.points as f32;
            bonuses.push(BonusNote {
                name: rule.name.clone(),
                points: rule.points as f32,
            });
        }
    }

    (total, bonuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::FlagRule;
    use std::collections::HashMap;

    fn make_candidate(title: &str, seeders: u32, size_bytes: u64) -> CandidateResult {
        CandidateResult {
            title: title.to_string(),
            size_bytes,
            seeders,
            source: "audiobay".to_string(),
            download_urls: vec!["http://example/dl".to_string()],
            format_hint: None,
            publish_date: None,
        }
    }

    fn target() -> TargetMetadata {
        TargetMetadata::new("The Wild Robot on the Island").with_author("Peter Brown")
    }

    #[test]
    fn test_coverage_gate_rejects_partial_title() {
        // "The Wild Robot" covers 2 of 3 significant words (wild, robot,
        // island) -> 67%, below the gate
        let candidate = make_candidate("The Wild Robot [M4B]", 50, 450_000_000);
        let ranked = rank(&[candidate], &target(), &RankingOptions::default());

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].base_score, 0.0);
        assert!(!ranked[0].breakdown.coverage_passed);
        assert!((ranked[0].breakdown.coverage - 2.0 / 3.0).abs() < 0.01);
        assert!(!ranked[0].qualifies());
    }

    #[test]
    fn test_full_coverage_scores_normally() {
        let candidate = make_candidate(
            "The Wild Robot on the Island [Unabridged] [M4B]",
            50,
            450_000_000,
        );
        let ranked = rank(&[candidate], &target(), &RankingOptions::default());

        let top = &ranked[0];
        assert!(top.breakdown.coverage_passed);
        assert_eq!(top.breakdown.coverage, 1.0);
        // Exact title followed by a bracket boundary: full title points
        assert_eq!(top.breakdown.title, TITLE_MAX);
        assert!(top.qualifies(), "base {} should qualify", top.base_score);
    }

    #[test]
    fn test_coverage_gate_zeroes_regardless_of_other_stages() {
        // Great seeds, perfect format, matching author - still zero
        let candidate = make_candidate("Wild Robot by Peter Brown M4B", 999, 450_000_000);
        let target = TargetMetadata::new("The Wild Robot on the Island Keeps Going");
        let ranked = rank(&[candidate], &target, &RankingOptions::default());
        assert_eq!(ranked[0].base_score, 0.0);
    }

    #[test]
    fn test_title_exact_with_by_boundary() {
        let (score, _) = title_score("The Wild Robot on the Island by Peter Brown", "The Wild Robot on the Island");
        assert_eq!(score, TITLE_MAX);
    }

    #[test]
    fn test_title_strict_prefix_gets_partial_credit() {
        let (score, note) = title_score("The Wild Robot on the Island", "The Wild Robot");
        assert!(score < TITLE_MAX);
        assert!(score >= TITLE_MAX * 0.5);
        assert!(note.unwrap().contains("strict prefix"));
    }

    #[test]
    fn test_title_fuzzy_fallback() {
        let (score, _) = title_score("Teh Wild Robot on the Island", "The Wild Robot on the Island");
        assert!(score > TITLE_MAX * 0.8, "small typo should keep most credit, got {}", score);
        assert!(score < TITLE_MAX);
    }

    #[test]
    fn test_author_exact_containment() {
        let (score, _) = author_score("The Wild Robot - Peter Brown - 2016", Some("Peter Brown"));
        assert_eq!(score, AUTHOR_MAX);
    }

    #[test]
    fn test_author_partial_overlap_of_multiple_authors() {
        let (score, _) = author_score(
            "Good Omens by Neil Gaiman",
            Some("Neil Gaiman & Terry Pratchett"),
        );
        assert_eq!(score, AUTHOR_MAX * 0.5);
    }

    #[test]
    fn test_author_role_qualifiers_filtered() {
        let (score, _) = author_score(
            "Project Hail Mary - Andy Weir",
            Some("Andy Weir, Ray Porter (Narrator)"),
        );
        // The narrator credit is dropped, leaving one author that matches
        assert_eq!(score, AUTHOR_MAX);
    }

    #[test]
    fn test_author_missing_is_neutral() {
        let (score, note) = author_score("Anything", None);
        assert_eq!(score, AUTHOR_MAX * 0.5);
        assert!(note.is_some());
    }

    #[test]
    fn test_availability_monotonic_and_bounded() {
        assert_eq!(availability_score(0), 0.0);
        assert!((availability_score(9) - 6.0).abs() < 0.01);
        assert!((availability_score(999) - 15.0).abs() < 0.01);

        let mut previous = -1.0f32;
        for seeders in [0u32, 1, 2, 5, 9, 20, 100, 999, 100_000] {
            let score = availability_score(seeders);
            assert!(score >= previous, "seed score must be non-decreasing");
            assert!(score <= AVAILABILITY_MAX);
            previous = score;
        }
    }

    #[test]
    fn test_size_neutral_without_duration() {
        let (score, _) = size_score(450_000_000, None);
        assert_eq!(score, SIZE_MAX * 0.5);
    }

    #[test]
    fn test_size_in_band_scores_full() {
        // 600 minutes at ~750 KiB/min
        let (score, note) = size_score(600 * 768 * 1024, Some(600));
        assert_eq!(score, SIZE_MAX);
        assert!(note.is_none());
    }

    #[test]
    fn test_size_out_of_band_penalized() {
        // 2 KiB/min is far below the band
        let (low, _) = size_score(600 * 2 * 1024, Some(600));
        assert!(low < 1.0);
        // 30 MiB/min is far above the band
        let (high, _) = size_score(600 * 30 * 1024 * 1024, Some(600));
        assert!(high < SIZE_MAX);
    }

    #[test]
    fn test_dual_threshold_negative_bonus_disqualifies() {
        let candidate = make_candidate(
            "The Wild Robot on the Island [M4B] ABRIDGED",
            30,
            450_000_000,
        );
        let options = RankingOptions {
            source_priorities: HashMap::new(),
            flag_rules: vec![FlagRule {
                name: "abridged".to_string(),
                pattern: "abridged".to_string(),
                points: -40,
            }],
        };

        let ranked = rank(&[candidate], &target(), &options);
        let top = &ranked[0];

        assert!(
            top.base_score >= QUALIFYING_THRESHOLD,
            "base {} should clear the bar on its own",
            top.base_score
        );
        assert!(top.final_score < QUALIFYING_THRESHOLD);
        assert!(!top.qualifies());
        assert!(select(&ranked).is_none());
    }

    #[test]
    fn test_source_priority_breaks_ties() {
        let a = make_candidate("The Wild Robot on the Island [M4B]", 30, 450_000_000);
        let mut b = a.clone();
        b.source = "preferred-source".to_string();

        let mut priorities = HashMap::new();
        priorities.insert("preferred-source".to_string(), 10);
        let options = RankingOptions {
            source_priorities: priorities,
            flag_rules: vec![],
        };

        let ranked = rank(&[a, b], &target(), &options);
        assert_eq!(ranked[0].candidate.source, "preferred-source");
        assert_eq!(ranked[0].bonus_points, 10.0);
    }

    #[test]
    fn test_tie_broken_by_base_then_input_order() {
        let strong = make_candidate("The Wild Robot on the Island [M4B]", 30, 450_000_000);
        let mut boosted = make_candidate("The Wild Robot on the Island [MP3]", 30, 450_000_000);
        boosted.source = "boosted".to_string();

        let options = RankingOptions::default();
        let ranked = rank(&[boosted.clone(), strong.clone()], &target(), &options);
        // m4b beats mp3 on base score
        assert!(ranked[0].candidate.title.contains("M4B"));

        // Identical candidates: input order is preserved
        let ranked = rank(&[strong.clone(), strong.clone()], &target(), &options);
        assert_eq!(ranked[0].input_order, 0);
        assert_eq!(ranked[1].input_order, 1);
    }

    #[test]
    fn test_rank_is_deterministic() {
        let candidates = vec![
            make_candidate("The Wild Robot on the Island [M4B]", 12, 450_000_000),
            make_candidate("The Wild Robot on the Island MP3", 99, 350_000_000),
            make_candidate("The Wild Robot", 500, 450_000_000),
        ];
        let options = RankingOptions {
            source_priorities: HashMap::new(),
            flag_rules: vec![FlagRule {
                name: "unabridged".to_string(),
                pattern: "unabridged".to_string(),
                points: 10,
            }],
        };

        let first = rank(&candidates, &target(), &options);
        let second = rank(&candidates, &target(), &options);

        let a = serde_json::to_string(&first).unwrap();
        let b = serde_json::to_string(&second).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_select_returns_none_when_nothing_qualifies() {
        let candidates = vec![make_candidate("Completely Different Book", 50, 450_000_000)];
        let ranked = rank(&candidates, &target(), &RankingOptions::default());
        assert!(select(&ranked).is_none());
    }

    #[test]
    fn test_select_returns_top_qualifier() {
        let candidates = vec![
            make_candidate("The Wild Robot", 50, 450_000_000),
            make_candidate("The Wild Robot on the Island [M4B]", 50, 450_000_000),
        ];
        let ranked = rank(&candidates, &target(), &RankingOptions::default());
        let selected = select(&ranked).expect("should qualify");
        assert!(selected.candidate.title.contains("[M4B]"));
    }

    #[test]
    fn test_split_authors() {
        assert_eq!(split_authors("Peter Brown"), vec!["peter brown"]);
        assert_eq!(
            split_authors("Neil Gaiman & Terry Pratchett"),
            vec!["neil gaiman", "terry pratchett"]
        );
        assert_eq!(
            split_authors("Andy Weir, Ray Porter (Narrator)"),
            vec!["andy weir"]
        );
        assert_eq!(
            split_authors("A. Author and B. Translator"),
            vec!["a. author"]
        );
    }
}
