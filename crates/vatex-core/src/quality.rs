//! Weighted quality scoring over a validated extraction.
//!
//! Produces a 0-100 score from five factors and a confidence-boost
//! multiplier the pipeline applies to the extraction confidence. The
//! scorer reads the extraction, document facts, and validation outcome;
//! it never mutates any of them.

use rust_decimal::Decimal;

use crate::models::{
    DocumentType, ExtractedAmounts, ExtractionMethod, HeuristicConfig, IssueCode,
    JurisdictionConfig, QualityAssessment, QualityFactors, ValidationResult,
};
use crate::validate::DocumentFacts;

/// Everything the scorer needs about one processing attempt.
pub struct ScoringContext<'a> {
    pub method: ExtractionMethod,
    pub amounts: &'a ExtractedAmounts,
    pub facts: &'a DocumentFacts,
    pub validation: &'a ValidationResult,
    /// A stage failed outright before this result was produced.
    pub processing_failed: bool,
    /// This result came from a fallback strategy, not the primary path.
    pub used_fallback: bool,
}

pub struct QualityScorer {
    jurisdiction: JurisdictionConfig,
    heuristics: HeuristicConfig,
}

impl QualityScorer {
    pub fn new(jurisdiction: JurisdictionConfig, heuristics: HeuristicConfig) -> Self {
        Self {
            jurisdiction,
            heuristics,
        }
    }

    pub fn score(&self, ctx: &ScoringContext<'_>) -> QualityAssessment {
        let factors = QualityFactors {
            amount_quality: self.amount_quality(ctx),
            structure: self.structure(ctx),
            compliance: self.compliance(ctx),
            reliability: self.reliability(ctx),
            consistency: self.consistency(ctx),
        };
        let overall = factors.overall();

        let issues: Vec<_> = ctx.validation.all_issues().cloned().collect();
        let criticals = ctx
            .validation
            .all_issues()
            .filter(|i| i.severity == crate::models::IssueSeverity::Critical)
            .count();

        let compliant = factors.compliance >= 70.0 && criticals == 0;
        let confidence_boost = boost_for(overall, criticals);

        QualityAssessment {
            overall_score: overall,
            confidence_boost,
            compliant,
            factors,
            issues,
        }
    }

    fn amount_quality(&self, ctx: &ScoringContext<'_>) -> f32 {
        let all = ctx.amounts.all_amounts();
        let mut score = 100.0f32;

        if all.is_empty() {
            // -60 for an empty extraction, floored at 10.
            return (score - 60.0).max(10.0);
        }

        if all.iter().any(|a| *a < Decimal::ZERO) {
            score -= 30.0;
        }
        for amount in &all {
            if amount.is_zero() && ctx.facts.tax_exempt {
                score -= 5.0;
            }
            if *amount > Decimal::ZERO && *amount < self.heuristics.tiny_amount {
                score -= 10.0;
            }
            if *amount > self.heuristics.huge_amount {
                score -= 15.0;
            }
            if amount.normalize().scale() > 2 {
                score -= 3.0;
            }
        }
        if has_duplicates(&all)
            || ctx
                .amounts
                .validation_flags
                .contains(IssueCode::DuplicateAmounts.as_flag())
        {
            score -= 20.0;
        }

        score.clamp(0.0, 100.0)
    }

    fn structure(&self, ctx: &ScoringContext<'_>) -> f32 {
        let mut score = 100.0f32;
        if ctx.amounts.document_type == DocumentType::Other {
            score -= 15.0;
        }
        if ctx.facts.business_name.is_none() {
            score -= 10.0;
        }
        if ctx.facts.tax_id.is_none() {
            score -= 15.0;
        }
        if ctx.facts.document_date.is_none() {
            score -= 8.0;
        }
        if matches!(
            ctx.method,
            ExtractionMethod::Enhanced | ExtractionMethod::VisionAi
        ) {
            score += 10.0;
        }
        score.clamp(0.0, 100.0)
    }

    fn compliance(&self, ctx: &ScoringContext<'_>) -> f32 {
        let mut score = 100.0f32;

        let bad_line_rates = ctx
            .facts
            .line_item_rates
            .iter()
            .filter(|r| !self.jurisdiction.valid_rates.contains(r))
            .count();
        score -= 25.0 * bad_line_rates as f32;

        if let Some(tax_id) = &ctx.facts.tax_id {
            let malformed = ctx
                .validation
                .errors
                .iter()
                .any(|e| e.code == IssueCode::InvalidTaxId);
            if malformed {
                score -= 8.0;
            } else if !tax_id.starts_with(&self.jurisdiction.country) {
                score -= 15.0;
            }
        }

        if ctx
            .validation
            .errors
            .iter()
            .any(|e| e.code == IssueCode::CurrencyMismatch)
        {
            score -= 20.0;
        }

        score.clamp(0.0, 100.0)
    }

    fn reliability(&self, ctx: &ScoringContext<'_>) -> f32 {
        let mut score = ctx.method.reliability_base();
        if ctx.processing_failed {
            score -= 40.0;
        }
        if ctx.used_fallback {
            score -= 20.0;
        }
        score.clamp(0.0, 100.0)
    }

    fn consistency(&self, ctx: &ScoringContext<'_>) -> f32 {
        let mut score = 100.0f32;
        if ctx
            .validation
            .all_issues()
            .any(|i| i.code == IssueCode::TotalMismatch)
        {
            score -= 25.0;
        }
        if ctx
            .validation
            .all_issues()
            .any(|i| i.code == IssueCode::LineItemMismatch)
        {
            score -= 15.0;
        }
        score.clamp(0.0, 100.0)
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(JurisdictionConfig::default(), HeuristicConfig::default())
    }
}

fn has_duplicates(amounts: &[Decimal]) -> bool {
    let mut sorted: Vec<Decimal> = amounts.to_vec();
    sorted.sort();
    sorted.windows(2).any(|w| w[0] == w[1])
}

/// Boost bucket from the overall score, degraded per critical issue,
/// clamped to [0.5, 1.3].
fn boost_for(overall: f32, criticals: usize) -> f32 {
    let base = if overall >= 90.0 {
        1.15
    } else if overall >= 80.0 {
        1.10
    } else if overall >= 70.0 {
        1.05
    } else if overall < 30.0 {
        0.70
    } else if overall < 50.0 {
        0.85
    } else {
        1.0
    };
    (base * (1.0 - 0.1 * criticals as f32)).clamp(0.5, 1.3)
}
