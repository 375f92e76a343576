//! Cross-validation of independent extraction attempts.
//!
//! When more than one strategy produced a usable result (say the vision
//! collaborator and the pattern extractor), this engine reconciles them
//! into a single result with an agreement score, summary statistics and
//! an explicit conflict-resolution verdict.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{
    AmountStatistics, ConflictResolution, CrossValidationResult, ExtractedAmounts,
    ExtractionMethod,
};

/// One extraction attempt plus what validation said about it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub amounts: ExtractedAmounts,
    pub method: ExtractionMethod,
    /// Quality scorer called this candidate jurisdiction-compliant.
    pub compliant: bool,
    /// Validation raised no errors at all.
    pub validation_clean: bool,
}

impl Candidate {
    /// Per-method weight: confidence plus method/compliance bonuses,
    /// clamped to [0.1, 1.0].
    pub fn weight(&self) -> f32 {
        let mut weight = self.amounts.confidence + self.method.weight_bonus();
        if self.compliant {
            weight += 0.1;
        }
        if self.validation_clean {
            weight += 0.05;
        }
        weight.clamp(0.1, 1.0)
    }
}

pub struct CrossValidationEngine;

impl CrossValidationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Reconcile two or more candidates. Returns `None` when fewer than
    /// two were supplied; a single candidate needs no reconciliation.
    pub fn cross_validate(&self, candidates: &[Candidate]) -> Option<CrossValidationResult> {
        if candidates.len() < 2 {
            return None;
        }

        let agreement = pairwise_agreement(candidates);
        let statistics = statistics(candidates);
        let primary_idx = self.select_primary(candidates, agreement);
        let resolution = resolution_for(agreement);
        let confidence = combined_confidence(candidates, agreement, statistics.std_dev);

        debug!(
            agreement,
            ?resolution,
            confidence,
            "cross-validation complete"
        );

        let primary = candidates[primary_idx].amounts.clone();
        let alternatives = candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != primary_idx)
            .map(|(_, c)| c.amounts.clone())
            .collect();

        Some(CrossValidationResult {
            agreement,
            primary,
            alternatives,
            resolution,
            statistics,
            confidence,
        })
    }

    fn select_primary(&self, candidates: &[Candidate], agreement: f32) -> usize {
        if agreement > 0.8 {
            return index_of_max(candidates, |c| c.weight());
        }
        if let Some(idx) = candidates.iter().position(|c| {
            c.method == ExtractionMethod::VisionAi && c.amounts.confidence > 0.7
        }) {
            return idx;
        }
        index_of_max(candidates, |c| c.amounts.confidence)
    }
}

impl Default for CrossValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn index_of_max(candidates: &[Candidate], key: impl Fn(&Candidate) -> f32) -> usize {
    let mut best = 0;
    for (idx, candidate) in candidates.iter().enumerate().skip(1) {
        if key(candidate) > key(&candidates[best]) {
            best = idx;
        }
    }
    best
}

/// Two amounts agree when they differ by at most 5% of the larger one,
/// with an absolute floor of 1.
fn amounts_match(a: Decimal, b: Decimal) -> bool {
    let tolerance = (Decimal::new(5, 2) * a.max(b)).max(Decimal::ONE);
    (a - b).abs() <= tolerance
}

/// Fraction of cross-candidate amount comparisons that match.
fn pairwise_agreement(candidates: &[Candidate]) -> f32 {
    let mut matches = 0usize;
    let mut comparisons = 0usize;
    for (i, left) in candidates.iter().enumerate() {
        for right in candidates.iter().skip(i + 1) {
            for a in left.amounts.all_amounts() {
                for b in right.amounts.all_amounts() {
                    comparisons += 1;
                    if amounts_match(a, b) {
                        matches += 1;
                    }
                }
            }
        }
    }
    if comparisons == 0 {
        return 0.0;
    }
    matches as f32 / comparisons as f32
}

/// Mean, median, population stddev and 2-sigma outliers over the union
/// of every candidate's amounts.
fn statistics(candidates: &[Candidate]) -> AmountStatistics {
    let mut union: Vec<Decimal> = candidates
        .iter()
        .flat_map(|c| c.amounts.all_amounts())
        .collect();
    if union.is_empty() {
        return AmountStatistics::default();
    }
    union.sort();

    let count = Decimal::from(union.len());
    let sum: Decimal = union.iter().sum();
    let mean = (sum / count).round_dp(4);

    let median = if union.len() % 2 == 1 {
        union[union.len() / 2]
    } else {
        let mid = union.len() / 2;
        ((union[mid - 1] + union[mid]) / Decimal::TWO).round_dp(4)
    };

    let mean_f = mean.to_f64().unwrap_or(0.0);
    let variance = union
        .iter()
        .map(|v| {
            let diff = v.to_f64().unwrap_or(0.0) - mean_f;
            diff * diff
        })
        .sum::<f64>()
        / union.len() as f64;
    let std_dev = variance.sqrt();

    let outliers = union
        .iter()
        .filter(|v| (v.to_f64().unwrap_or(0.0) - mean_f).abs() > 2.0 * std_dev)
        .copied()
        .collect();

    AmountStatistics {
        mean,
        median,
        std_dev,
        outliers,
    }
}

fn resolution_for(agreement: f32) -> ConflictResolution {
    if agreement > 0.9 {
        ConflictResolution::Consensus
    } else if agreement > 0.7 {
        ConflictResolution::WeightedAverage
    } else if agreement > 0.4 {
        ConflictResolution::Primary
    } else {
        ConflictResolution::ManualReview
    }
}

/// Combined confidence for the reconciled result, clamped to
/// [0.1, 0.98] so cross-validation never claims certainty.
fn combined_confidence(candidates: &[Candidate], agreement: f32, std_dev: f64) -> f32 {
    let mut confidence = 0.5 + 0.3 * agreement;
    if std_dev < 5.0 {
        confidence += 0.1;
    }
    if std_dev < 1.0 {
        confidence += 0.1;
    }
    let confident = candidates
        .iter()
        .filter(|c| c.amounts.confidence > 0.8)
        .count();
    confidence += (0.05 * confident as f32).min(0.2);

    let has_vision = candidates
        .iter()
        .any(|c| c.method == ExtractionMethod::VisionAi);
    let has_spreadsheet = candidates
        .iter()
        .any(|c| c.method == ExtractionMethod::SpreadsheetParser);
    if has_vision && has_spreadsheet {
        confidence += 0.1;
    }

    confidence.clamp(0.1, 0.98)
}
