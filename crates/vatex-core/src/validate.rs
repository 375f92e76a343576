//! Jurisdiction compliance validation.
//!
//! A rule engine over an extraction result plus whatever document facts
//! the caller could establish (tax ID, totals, currency). Errors block
//! auto-acceptance when severe enough; warnings only reduce confidence.

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

use crate::error::{Result, VatexError};
use crate::models::{
    DocumentType, ExtractedAmounts, HeuristicConfig, Issue, IssueCode, JurisdictionConfig,
    ValidationResult,
};

/// Document-level facts established outside amount extraction.
#[derive(Debug, Clone, Default)]
pub struct DocumentFacts {
    pub tax_id: Option<String>,
    pub business_name: Option<String>,
    pub currency: Option<String>,
    pub document_date: Option<NaiveDate>,
    /// Net amount before tax, when stated on the document.
    pub subtotal: Option<Decimal>,
    /// Stated grand total, when present.
    pub grand_total: Option<Decimal>,
    /// Per-line-item tax amounts, when the document itemizes them.
    pub line_item_tax: Vec<Decimal>,
    /// Per-line-item rates, for jurisdiction rate checking.
    pub line_item_rates: Vec<Decimal>,
    /// Document explicitly declares a tax exemption.
    pub tax_exempt: bool,
}

pub struct ComplianceValidator {
    jurisdiction: JurisdictionConfig,
    heuristics: HeuristicConfig,
    tax_id_re: Regex,
}

impl ComplianceValidator {
    pub fn new(jurisdiction: JurisdictionConfig, heuristics: HeuristicConfig) -> Result<Self> {
        let tax_id_re = Regex::new(&jurisdiction.tax_id_pattern)
            .map_err(|e| VatexError::Config(format!("invalid tax ID pattern: {e}")))?;
        Ok(Self {
            jurisdiction,
            heuristics,
            tax_id_re,
        })
    }

    pub fn validate(&self, amounts: &ExtractedAmounts, facts: &DocumentFacts) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.check_amounts(amounts, facts, &mut result);
        self.check_rates(amounts, facts, &mut result);
        self.check_identity(facts, &mut result);
        self.check_arithmetic(amounts, facts, &mut result);
        self.check_business_logic(amounts, facts, &mut result);

        result
    }

    fn check_amounts(
        &self,
        amounts: &ExtractedAmounts,
        facts: &DocumentFacts,
        result: &mut ValidationResult,
    ) {
        let all = amounts.all_amounts();

        if let Some(negative) = all.iter().find(|a| **a < Decimal::ZERO) {
            result.push_error(Issue::new(
                IssueCode::NegativeAmount,
                format!("negative tax amount {negative} extracted"),
                "blocks auto-acceptance; requires manual review",
            ));
        }

        if all.is_empty() {
            result.push_error(Issue::new(
                IssueCode::NoTaxFound,
                "no tax amounts were extracted",
                "blocks auto-acceptance; requires manual review",
            ));
            return;
        }

        if amounts.total_tax() == Decimal::ZERO && !facts.tax_exempt {
            result.push_error(Issue::new(
                IssueCode::ZeroTaxTotal,
                "total extracted tax is zero and the document is not tax-exempt",
                "verify exemption status or re-extract",
            ));
        }

        // Every amount round and large: likely an estimate, not extraction.
        let round_and_large = all
            .iter()
            .all(|a| a.fract().is_zero() && a.abs() >= self.heuristics.round_number_threshold);
        if round_and_large {
            result.push_warning(Issue::new(
                IssueCode::RoundNumbersOnly,
                "all extracted amounts are round numbers above the estimate threshold",
                "amounts may be estimates rather than document values",
            ));
        }
    }

    fn check_rates(
        &self,
        amounts: &ExtractedAmounts,
        facts: &DocumentFacts,
        result: &mut ValidationResult,
    ) {
        if let Some(rate) = amounts.tax_rate {
            if !self.jurisdiction.valid_rates.contains(&rate) {
                result.push_error(Issue::new(
                    IssueCode::RateNotInJurisdictionSet,
                    format!(
                        "rate {rate}% is not a valid {} VAT rate",
                        self.jurisdiction.country
                    ),
                    "confidence reduced; verify the rate",
                ));
            }
        }

        for rate in &facts.line_item_rates {
            if !self.jurisdiction.valid_rates.contains(rate) {
                result.push_warning(Issue::new(
                    IssueCode::RateNotInJurisdictionSet,
                    format!("line item uses non-standard rate {rate}%"),
                    "verify the line item rate",
                ));
            }
        }
    }

    fn check_identity(&self, facts: &DocumentFacts, result: &mut ValidationResult) {
        match &facts.tax_id {
            Some(tax_id) if !self.tax_id_re.is_match(tax_id) => {
                result.push_error(Issue::new(
                    IssueCode::InvalidTaxId,
                    format!("tax ID does not match the {} format", self.jurisdiction.country),
                    "verify the VAT registration number",
                ));
            }
            Some(_) => {}
            None => {
                result
                    .suggestions
                    .push("add the supplier VAT registration number".to_string());
            }
        }

        if let Some(currency) = &facts.currency {
            if !currency.eq_ignore_ascii_case(&self.jurisdiction.currency) {
                result.push_error(Issue::new(
                    IssueCode::CurrencyMismatch,
                    format!(
                        "document currency {currency} differs from jurisdiction currency {}",
                        self.jurisdiction.currency
                    ),
                    "amounts may need conversion before filing",
                ));
            }
        }
    }

    fn check_arithmetic(
        &self,
        amounts: &ExtractedAmounts,
        facts: &DocumentFacts,
        result: &mut ValidationResult,
    ) {
        if let (Some(subtotal), Some(grand_total)) = (facts.subtotal, facts.grand_total) {
            let expected = subtotal + amounts.total_tax();
            if (expected - grand_total).abs() > self.heuristics.total_tolerance {
                result.push_error(Issue::new(
                    IssueCode::TotalMismatch,
                    format!(
                        "subtotal {subtotal} + tax {} = {expected}, document states {grand_total}",
                        amounts.total_tax()
                    ),
                    "blocks auto-acceptance; amounts are inconsistent",
                ));
            }
        }

        if !facts.line_item_tax.is_empty() {
            let line_sum: Decimal = facts.line_item_tax.iter().sum();
            if (line_sum - amounts.total_tax()).abs() > self.heuristics.line_item_tolerance {
                result.push_warning(Issue::new(
                    IssueCode::LineItemMismatch,
                    format!(
                        "line item tax sums to {line_sum}, extraction found {}",
                        amounts.total_tax()
                    ),
                    "verify per-line tax amounts",
                ));
            }
        }
    }

    fn check_business_logic(
        &self,
        amounts: &ExtractedAmounts,
        _facts: &DocumentFacts,
        result: &mut ValidationResult,
    ) {
        if !amounts.sales_tax.is_empty() && !amounts.purchase_tax.is_empty() {
            result.push_warning(Issue::new(
                IssueCode::MixedTaxCategories,
                "document carries both sales and purchase tax",
                "unusual but not necessarily wrong; verify the document type",
            ));
        }

        if amounts.document_type == DocumentType::Other && !amounts.is_empty() {
            result
                .suggestions
                .push("document type could not be determined from the text".to_string());
        }
    }
}
