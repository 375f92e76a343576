//! Text extractor: applies the tiered pattern library to plain text.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{ExtractedAmounts, IssueCode, PatternTier, TaxCategory};

use super::classify;
use super::patterns::{
    self, parse_amount, round2, EXCLUSIONS, GENERIC, HIGH_PRIORITY, RATE_CODE, STANDARD,
    TAX_RATE, TOTAL_AMOUNT,
};

/// Confidence contributed by one unique match in each tier. The high
/// tier sits above the text strategy's 0.60 floor so a single explicit
/// labeled total is enough to auto-accept.
const TIER_HIGH_INCREMENT: f32 = 0.65;
const TIER_STANDARD_INCREMENT: f32 = 0.4;
const TIER_GENERIC_INCREMENT: f32 = 0.3;
const DERIVED_INCREMENT: f32 = 0.2;
/// Applied when two or more amounts were found (genuine breakdown).
const MULTI_AMOUNT_BONUS: f32 = 0.1;

/// Tiered pattern extractor over plain text.
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract tax amounts, rate, and total from `text`.
    ///
    /// `hint` is the caller's ledger side; it is overridden only when
    /// the keyword classifier is confident.
    pub fn extract(&self, text: &str, hint: TaxCategory) -> ExtractedAmounts {
        let classification = classify::classify(text, hint);
        let category = classification.document_type.category().unwrap_or(hint);

        let mut result = ExtractedAmounts::new(classification.document_type);
        let excluded = exclusion_set(text);

        result.tax_rate = extract_rate(text);
        result.total_amount = TOTAL_AMOUNT
            .captures(text)
            .and_then(|caps| parse_amount(&caps[1]));

        let mut seen: BTreeSet<Decimal> = BTreeSet::new();
        let mut confidence = 0.0f32;

        let tiers: [(PatternTier, &[(&str, regex::Regex)], f32); 3] = [
            (PatternTier::High, &HIGH_PRIORITY, TIER_HIGH_INCREMENT),
            (PatternTier::Standard, &STANDARD, TIER_STANDARD_INCREMENT),
            (PatternTier::Generic, &GENERIC, TIER_GENERIC_INCREMENT),
        ];

        for (tier, bank, increment) in tiers {
            for (name, re) in bank.iter() {
                for caps in re.captures_iter(text) {
                    let Some(amount) = parse_amount(&caps[1]) else {
                        continue;
                    };
                    let rounded = round2(amount);

                    if amount < Decimal::ZERO {
                        result.add_flag(IssueCode::NegativeAmount.as_flag());
                        continue;
                    }
                    if excluded.contains(&rounded) {
                        debug!(pattern = name, %amount, "amount excluded as non-tax payment");
                        continue;
                    }
                    if !seen.insert(rounded) {
                        result.add_flag(IssueCode::DuplicateAmounts.as_flag());
                        continue;
                    }

                    result.push_amount(category, rounded, *name, tier, increment);
                    confidence = (confidence + increment).min(1.0);
                }
            }
            // Once a tier yields amounts, more generic tiers are skipped.
            if !result.is_empty() {
                break;
            }
        }

        // Derived amount when nothing explicit was found but the total
        // and rate are both known: total × rate / (100 + rate).
        if result.is_empty() {
            if let (Some(total), Some(rate)) = (result.total_amount, result.tax_rate) {
                if rate >= Decimal::ZERO && total > Decimal::ZERO {
                    let derived = round2(total * rate / (Decimal::new(100, 0) + rate));
                    result.push_amount(
                        category,
                        derived,
                        "derived_from_total_and_rate",
                        PatternTier::Derived,
                        DERIVED_INCREMENT,
                    );
                    confidence = (confidence + DERIVED_INCREMENT).min(1.0);
                }
            }
        }

        if result.all_amounts().len() >= 2 {
            confidence = (confidence + MULTI_AMOUNT_BONUS).min(1.0);
        }

        result.set_confidence(confidence);
        result
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Amounts appearing in payment/lease/rental/instalment lines, rounded
/// to 2 decimals. Any tier match equal to one of these is dropped.
fn exclusion_set(text: &str) -> BTreeSet<Decimal> {
    let mut set = BTreeSet::new();
    for (name, re) in EXCLUSIONS.iter() {
        for caps in re.captures_iter(text) {
            if let Some(amount) = parse_amount(&caps[1]) {
                debug!(pattern = name, %amount, "exclusion candidate");
                set.insert(round2(amount));
            }
        }
    }
    set
}

/// Tax rate from an explicit percentage, falling back to a
/// rate-category code.
fn extract_rate(text: &str) -> Option<Decimal> {
    if let Some(caps) = TAX_RATE.captures(text) {
        if let Some(rate) = parse_amount(&caps[1]) {
            return Some(rate);
        }
    }
    RATE_CODE
        .captures(text)
        .and_then(|caps| patterns::rate_for_code(&caps[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_labeled_vat_total_extracted_with_high_confidence() {
        let result = TextExtractor::new().extract(
            "Total Amount VAT: €134.96",
            TaxCategory::Purchases,
        );
        assert!(result.purchase_tax.contains(&d("134.96")));
        assert!(result.confidence > 0.6);
        assert_eq!(result.provenance[0].tier, PatternTier::High);
        assert!(result.provenance_consistent());
    }

    #[test]
    fn test_high_tier_match_skips_lower_tiers() {
        // The generic "VAT:" line must not add a second amount once the
        // explicit total matched.
        let text = "VAT Total: €41.40\nVAT: €99.99";
        let result = TextExtractor::new().extract(text, TaxCategory::Sales);
        assert_eq!(result.sales_tax, vec![d("41.40")]);
    }

    #[test]
    fn test_exclusions_remove_lease_amounts() {
        // Lease amount numerically identical to a tax line: both dropped.
        let text = "Monthly lease payment: €350.00\nVAT: €350.00\nVAT: €41.40";
        let result = TextExtractor::new().extract(text, TaxCategory::Purchases);
        assert_eq!(result.purchase_tax, vec![d("41.40")]);
    }

    #[test]
    fn test_duplicate_amounts_flagged_once() {
        let text = "Total VAT: €50.00\nVAT Total: €50.00";
        let result = TextExtractor::new().extract(text, TaxCategory::Sales);
        assert_eq!(result.sales_tax, vec![d("50.00")]);
        assert!(result
            .validation_flags
            .contains(IssueCode::DuplicateAmounts.as_flag()));
    }

    #[test]
    fn test_derived_amount_from_total_and_rate() {
        let text = "Grand Total: €123.00\nVAT rate: 23%";
        let result = TextExtractor::new().extract(text, TaxCategory::Purchases);
        assert_eq!(result.tax_rate, Some(d("23")));
        assert_eq!(result.total_amount, Some(d("123.00")));
        // 123 × 23 / 123 = 23
        assert_eq!(result.purchase_tax, vec![d("23.00")]);
        assert_eq!(result.provenance[0].tier, PatternTier::Derived);
        assert!(result.confidence <= 0.2 + f32::EPSILON);
    }

    #[test]
    fn test_rate_from_category_code() {
        let text = "RED13.5: €27.00";
        let result = TextExtractor::new().extract(text, TaxCategory::Purchases);
        assert_eq!(result.tax_rate, Some(d("13.5")));
        assert_eq!(result.purchase_tax, vec![d("27.00")]);
    }

    #[test]
    fn test_multi_amount_bonus() {
        let text = "VAT @ 23%: €41.40\nVAT @ 13.5%: €27.00";
        let result = TextExtractor::new().extract(text, TaxCategory::Sales);
        assert_eq!(result.sales_tax.len(), 2);
        // two standard matches (0.4 + 0.4) plus the breakdown bonus
        assert!((result.confidence - 0.9).abs() < 0.001);
    }

    #[test]
    fn test_deterministic_over_fixed_text() {
        let text = "Total VAT: €134.96\nVAT @ 23%: €41.40\nlease payment €80.00";
        let first = TextExtractor::new().extract(text, TaxCategory::Purchases);
        let second = TextExtractor::new().extract(text, TaxCategory::Purchases);
        assert_eq!(first.purchase_tax, second.purchase_tax);
        assert_eq!(first.confidence, second.confidence);
        assert_eq!(first.validation_flags, second.validation_flags);
    }

    #[test]
    fn test_empty_text_yields_empty_result() {
        let result = TextExtractor::new().extract("", TaxCategory::Sales);
        assert!(result.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_negative_amount_dropped_and_flagged() {
        let text = "VAT Total: €-12.50";
        let result = TextExtractor::new().extract(text, TaxCategory::Sales);
        assert!(result.is_empty());
        assert!(result
            .validation_flags
            .contains(IssueCode::NegativeAmount.as_flag()));
    }
}
