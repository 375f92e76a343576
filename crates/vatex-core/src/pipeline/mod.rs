//! Extraction pipeline orchestrator.
//!
//! Strategies run in strict priority order, each with its own
//! confidence floor; the first to succeed and clear its floor wins.
//! When earlier strategies also produced amounts, the cross-validation
//! engine reconciles them with the winner. The pipeline never returns
//! an error: every path, including total failure, degrades to the
//! manual-review terminal state with an actionable message.

pub mod template;
pub mod vision;

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::{AuditSink, TracingSink};
use crate::crossval::{Candidate, CrossValidationEngine};
use crate::error::{Result, VisionError};
use crate::extract::patterns::{parse_amount, round2, ANY_AMOUNT, DEEP_SCAN_LINE};
use crate::extract::{Grid, SpreadsheetAggregator, TextExtractor};
use crate::models::{
    ConflictResolution, ExtractedAmounts, ExtractionMethod, Issue, IssueCode, IssueSeverity,
    PatternTier, QualityAssessment, TaxCategory, VatexConfig,
};
use crate::quality::{QualityScorer, ScoringContext};
use crate::validate::{ComplianceValidator, DocumentFacts};

pub use template::TemplateLibrary;
pub use vision::{ResilientVision, VisionService};

/// Everything the caller hands over for one document.
pub struct DocumentInput<'a> {
    pub text: &'a str,
    pub file_name: &'a str,
    pub category: TaxCategory,
    pub grid: Option<&'a Grid>,
    pub facts: DocumentFacts,
}

impl<'a> DocumentInput<'a> {
    pub fn text(text: &'a str, file_name: &'a str, category: TaxCategory) -> Self {
        Self {
            text,
            file_name,
            category,
            grid: None,
            facts: DocumentFacts::default(),
        }
    }
}

/// Final, always-structured outcome of processing one document.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub success: bool,
    pub confidence: f32,
    pub method: ExtractionMethod,
    pub sales_tax: Vec<Decimal>,
    pub purchase_tax: Vec<Decimal>,
    pub extracted_text: String,
    pub issues: Vec<Issue>,
    pub requires_manual_review: bool,
    pub user_message: String,
    pub processing_time_ms: u64,
    /// Present whenever a winning extraction was scored.
    pub quality: Option<QualityAssessment>,
}

/// Serialized summary crossing the boundary to the storage collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSummary {
    pub method: ExtractionMethod,
    pub confidence: f32,
    pub total_sales_tax: Decimal,
    pub total_purchase_tax: Decimal,
    pub error_count: usize,
    pub warning_count: usize,
    pub requires_manual_review: bool,
    pub timestamp: DateTime<Utc>,
}

impl AuditSummary {
    pub fn from_report(report: &ExtractionReport) -> Self {
        let error_count = report
            .issues
            .iter()
            .filter(|i| i.severity >= IssueSeverity::High)
            .count();
        Self {
            method: report.method,
            confidence: report.confidence,
            total_sales_tax: report.sales_tax.iter().sum(),
            total_purchase_tax: report.purchase_tax.iter().sum(),
            error_count,
            warning_count: report.issues.len() - error_count,
            requires_manual_review: report.requires_manual_review,
            timestamp: Utc::now(),
        }
    }
}

/// One strategy's output before floor checking.
struct Attempt {
    amounts: ExtractedAmounts,
    method: ExtractionMethod,
    floor: f32,
}

/// Spreadsheet, vision, text patterns, templates, deep scan.
const STRATEGY_COUNT: usize = 5;

pub struct ExtractionPipeline {
    config: VatexConfig,
    text: TextExtractor,
    spreadsheet: SpreadsheetAggregator,
    templates: TemplateLibrary,
    validator: ComplianceValidator,
    scorer: QualityScorer,
    crossval: CrossValidationEngine,
    vision: Option<Box<dyn VisionService>>,
    audit: Box<dyn AuditSink>,
}

impl ExtractionPipeline {
    pub fn new(config: VatexConfig) -> Result<Self> {
        let validator = ComplianceValidator::new(
            config.jurisdiction.clone(),
            config.heuristics.clone(),
        )?;
        let scorer = QualityScorer::new(config.jurisdiction.clone(), config.heuristics.clone());
        let spreadsheet = SpreadsheetAggregator::new(config.heuristics.clone());
        Ok(Self {
            config,
            text: TextExtractor::new(),
            spreadsheet,
            templates: TemplateLibrary::new(),
            validator,
            scorer,
            crossval: CrossValidationEngine::new(),
            vision: None,
            audit: Box::new(TracingSink::new()),
        })
    }

    pub fn with_vision(mut self, vision: Box<dyn VisionService>) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_audit(mut self, audit: impl AuditSink + 'static) -> Self {
        self.audit = Box::new(audit);
        self
    }

    /// Process one document. Never fails: an unusable extraction is
    /// reported as the manual-review terminal state, not an error.
    pub fn process_document(&self, input: &DocumentInput<'_>) -> ExtractionReport {
        let started = Instant::now();
        let mut issues: Vec<Issue> = Vec::new();
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut winner: Option<(usize, ExtractionMethod)> = None;
        let mut attempts_run = 0usize;

        // Strategies in strict priority order, evaluated lazily so the
        // vision call never happens once an earlier strategy has won.
        for step in 0..STRATEGY_COUNT {
            let Some(attempt) = self.run_strategy(step, input, &mut issues) else {
                continue;
            };
            attempts_run += 1;
            self.audit.info(
                "strategy_attempt",
                &[
                    ("file_name", input.file_name.to_string()),
                    ("method", attempt.method.to_string()),
                    ("confidence", format!("{:.2}", attempt.amounts.confidence)),
                ],
            );
            if attempt.amounts.is_empty() {
                continue;
            }
            let cleared = attempt.amounts.confidence >= attempt.floor;
            if !cleared {
                issues.push(Issue::new(
                    IssueCode::LowConfidence,
                    format!(
                        "{} extraction confidence {:.2} below its {:.2} floor",
                        attempt.method, attempt.amounts.confidence, attempt.floor
                    ),
                    "result kept only for cross-validation",
                ));
            }
            let validation = self.validator.validate(&attempt.amounts, &input.facts);
            candidates.push(Candidate {
                compliant: validation.is_valid(),
                validation_clean: validation.errors.is_empty(),
                method: attempt.method,
                amounts: attempt.amounts,
            });
            if cleared {
                winner = Some((candidates.len() - 1, attempt.method));
                break;
            }
        }

        let Some((winner_idx, mut method)) = winner else {
            return self.manual_review_report(input, issues, started);
        };

        let mut amounts = candidates[winner_idx].amounts.clone();
        let used_fallback = attempts_run > 1;

        // Reconcile with the other strategies' results, when any exist.
        if let Some(cv) = self.crossval.cross_validate(&candidates) {
            let has_vision = candidates
                .iter()
                .any(|c| c.method == ExtractionMethod::VisionAi);
            if cv.agreement > 0.9 && has_vision && method != ExtractionMethod::VisionAi {
                method = ExtractionMethod::Enhanced;
                let combined = cv.confidence.max(amounts.confidence);
                amounts.set_confidence(combined);
            } else if cv.resolution == ConflictResolution::ManualReview {
                issues.push(Issue::new(
                    IssueCode::LowConfidence,
                    format!(
                        "extraction strategies disagree (agreement {:.2})",
                        cv.agreement
                    ),
                    "cross-validation could not reconcile the attempts",
                ));
            }
        }

        let validation = self.validator.validate(&amounts, &input.facts);
        let assessment = self.scorer.score(&ScoringContext {
            method,
            amounts: &amounts,
            facts: &input.facts,
            validation: &validation,
            processing_failed: false,
            used_fallback,
        });

        amounts.apply_boost(assessment.confidence_boost);

        issues.extend(validation.all_issues().cloned());
        let requires_manual_review = !validation.is_valid()
            || assessment.critical_issues() > 0
            || method == ExtractionMethod::DeepScan;

        let user_message = if requires_manual_review {
            format!(
                "Extracted {} tax amount(s) via {method}, but the result needs manual review.",
                amounts.all_amounts().len()
            )
        } else {
            format!(
                "Extracted {} tax amount(s) via {method} with {:.0}% confidence.",
                amounts.all_amounts().len(),
                amounts.confidence * 100.0
            )
        };

        let report = ExtractionReport {
            success: true,
            confidence: amounts.confidence,
            method,
            sales_tax: amounts.sales_tax.clone(),
            purchase_tax: amounts.purchase_tax.clone(),
            extracted_text: input.text.to_string(),
            issues,
            requires_manual_review,
            user_message,
            processing_time_ms: started.elapsed().as_millis() as u64,
            quality: Some(assessment),
        };
        self.emit_audit(input, &report);
        report
    }

    /// Run the strategy at `step`, if its preconditions hold.
    fn run_strategy(
        &self,
        step: usize,
        input: &DocumentInput<'_>,
        issues_out: &mut Vec<Issue>,
    ) -> Option<Attempt> {
        let floors = &self.config.pipeline;
        match step {
            0 => {
                let grid = input.grid?;
                match self.spreadsheet.aggregate(grid, input.category) {
                    Ok(amounts) => Some(Attempt {
                        amounts,
                        method: ExtractionMethod::SpreadsheetParser,
                        floor: floors.spreadsheet_floor,
                    }),
                    Err(e) => {
                        issues_out.push(Issue::new(
                            IssueCode::TextExtractionFailed,
                            format!("spreadsheet aggregation failed: {e}"),
                            "falling through to text strategies",
                        ));
                        None
                    }
                }
            }
            1 => {
                let vision = self.vision.as_ref()?;
                match vision.extract(input.text, input.file_name, input.category) {
                    Ok(amounts) => Some(Attempt {
                        amounts,
                        method: ExtractionMethod::VisionAi,
                        floor: floors.vision_floor,
                    }),
                    Err(VisionError::Timeout(ms)) => {
                        issues_out.push(Issue::new(
                            IssueCode::ProcessingTimeout,
                            format!("vision service timed out after {ms}ms"),
                            "falling through to pattern extraction",
                        ));
                        None
                    }
                    Err(VisionError::Unavailable(reason)) => {
                        issues_out.push(Issue::new(
                            IssueCode::VisionServiceUnavailable,
                            format!("vision service unavailable: {reason}"),
                            "falling through to pattern extraction",
                        ));
                        None
                    }
                }
            }
            2 => Some(Attempt {
                amounts: self.text.extract(input.text, input.category),
                method: ExtractionMethod::TextPattern,
                floor: floors.text_floor,
            }),
            3 => self
                .templates
                .match_text(input.text, input.category)
                .map(|amounts| Attempt {
                    amounts,
                    method: ExtractionMethod::TemplateMatch,
                    floor: floors.template_floor,
                }),
            4 => deep_scan(input.text, input.category).map(|amounts| Attempt {
                amounts,
                method: ExtractionMethod::DeepScan,
                floor: floors.deep_scan_floor,
            }),
            _ => None,
        }
    }

    /// Terminal state: no strategy produced a usable result. The report
    /// is still structured and actionable, never an unexplained zero.
    fn manual_review_report(
        &self,
        input: &DocumentInput<'_>,
        mut issues: Vec<Issue>,
        started: Instant,
    ) -> ExtractionReport {
        if issues.is_empty() {
            issues.push(Issue::new(
                IssueCode::NoTaxFound,
                "no extraction strategy found a tax amount",
                "manual review required",
            ));
        }
        let report = ExtractionReport {
            success: false,
            confidence: 0.0,
            method: ExtractionMethod::Unknown,
            sales_tax: Vec::new(),
            purchase_tax: Vec::new(),
            extracted_text: input.text.to_string(),
            issues,
            requires_manual_review: true,
            user_message:
                "Automated extraction could not produce a confident result; the document \
                 needs manual review."
                    .to_string(),
            processing_time_ms: started.elapsed().as_millis() as u64,
            quality: None,
        };
        self.emit_audit(input, &report);
        report
    }

    fn emit_audit(&self, input: &DocumentInput<'_>, report: &ExtractionReport) {
        info!(
            method = %report.method,
            confidence = report.confidence,
            success = report.success,
            "document processed"
        );
        self.audit.audit(
            "document_processed",
            &[
                ("file_name", input.file_name.to_string()),
                ("method", report.method.to_string()),
                ("confidence", format!("{:.2}", report.confidence)),
                ("success", report.success.to_string()),
                (
                    "requires_manual_review",
                    report.requires_manual_review.to_string(),
                ),
                ("issue_count", report.issues.len().to_string()),
            ],
        );
    }
}

/// Last-resort scan: any line holding a tax keyword and a plausible
/// monetary value. Results always require manual review.
fn deep_scan(text: &str, category: TaxCategory) -> Option<ExtractedAmounts> {
    let plausible_min = Decimal::new(1, 2);
    let plausible_max = Decimal::new(1_000_000, 0);
    let mut result = ExtractedAmounts::default();
    let mut seen: BTreeSet<Decimal> = BTreeSet::new();

    for line in text.lines() {
        if !DEEP_SCAN_LINE.is_match(line) {
            continue;
        }
        for caps in ANY_AMOUNT.captures_iter(line) {
            let Some(amount) = parse_amount(&caps[1]) else {
                continue;
            };
            let rounded = round2(amount);
            if rounded < plausible_min || rounded > plausible_max {
                continue;
            }
            if seen.insert(rounded) {
                result.push_amount(category, rounded, "deep_scan", PatternTier::Generic, 0.45);
            }
        }
    }

    if result.is_empty() {
        None
    } else {
        result.set_confidence(0.45);
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::vision::mock::MockVision;
    use super::*;
    use crate::audit::NullSink;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn pipeline() -> ExtractionPipeline {
        ExtractionPipeline::new(VatexConfig::default())
            .unwrap()
            .with_audit(NullSink)
    }

    fn vision_amounts(value: &str, confidence: f32) -> ExtractedAmounts {
        let mut amounts = ExtractedAmounts::default();
        amounts.push_amount(
            TaxCategory::Purchases,
            d(value),
            "vision",
            PatternTier::High,
            confidence,
        );
        amounts.set_confidence(confidence);
        amounts
    }

    #[test]
    fn test_labeled_total_clears_text_floor() {
        let input = DocumentInput::text(
            "Total Amount VAT: €134.96",
            "invoice.txt",
            TaxCategory::Purchases,
        );
        let report = pipeline().process_document(&input);
        assert!(report.success);
        assert_eq!(report.method, ExtractionMethod::TextPattern);
        assert!(report.purchase_tax.contains(&d("134.96")));
        assert!(report.confidence > 0.6);
        assert!(!report.requires_manual_review);
    }

    #[test]
    fn test_no_usable_strategy_terminates_in_manual_review() {
        let input = DocumentInput::text(
            "nothing relevant in this document",
            "note.txt",
            TaxCategory::Sales,
        );
        let report = pipeline().process_document(&input);
        assert!(!report.success);
        assert!(report.requires_manual_review);
        assert!(!report.issues.is_empty());
        assert_eq!(report.method, ExtractionMethod::Unknown);
        assert!(report.sales_tax.is_empty() && report.purchase_tax.is_empty());
    }

    #[test]
    fn test_grid_takes_priority_over_text() {
        let grid = Grid::new(
            vec!["Country".to_string(), "Net Total Tax".to_string()],
            vec![vec!["Ireland".to_string(), "7.55".to_string()]],
        );
        let mut input =
            DocumentInput::text("VAT: €99.99", "export.csv", TaxCategory::Sales);
        input.grid = Some(&grid);
        let report = pipeline().process_document(&input);
        assert_eq!(report.method, ExtractionMethod::SpreadsheetParser);
        assert_eq!(report.sales_tax, vec![d("7.55")]);
    }

    #[test]
    fn test_vision_agreement_upgrades_to_enhanced() {
        // Vision sits below its 0.70 floor, the text tier clears its
        // own floor, and the two agree exactly.
        let vision = MockVision::with_outcomes(vec![Ok(vision_amounts("134.96", 0.65))]);
        let pipeline = pipeline().with_vision(Box::new(vision));
        let input = DocumentInput::text(
            "Total Amount VAT: €134.96",
            "invoice.pdf",
            TaxCategory::Purchases,
        );
        let report = pipeline.process_document(&input);
        assert!(report.success);
        assert_eq!(report.method, ExtractionMethod::Enhanced);
        assert!(report.purchase_tax.contains(&d("134.96")));
    }

    #[test]
    fn test_vision_unavailable_falls_through() {
        let pipeline = pipeline().with_vision(Box::new(MockVision::unavailable()));
        let input = DocumentInput::text(
            "Total Amount VAT: €134.96",
            "invoice.pdf",
            TaxCategory::Purchases,
        );
        let report = pipeline.process_document(&input);
        assert!(report.success);
        assert_eq!(report.method, ExtractionMethod::TextPattern);
        assert!(report
            .issues
            .iter()
            .any(|i| i.code == IssueCode::VisionServiceUnavailable));
    }

    #[test]
    fn test_vision_timeout_reported_as_processing_timeout() {
        let vision = MockVision::with_outcomes(vec![Err(VisionError::Timeout(8000))]);
        let pipeline = pipeline().with_vision(Box::new(vision));
        let input = DocumentInput::text(
            "Total Amount VAT: €134.96",
            "invoice.pdf",
            TaxCategory::Purchases,
        );
        let report = pipeline.process_document(&input);
        assert!(report
            .issues
            .iter()
            .any(|i| i.code == IssueCode::ProcessingTimeout));
        assert!(report.success);
    }

    #[test]
    fn test_deep_scan_always_flags_manual_review() {
        // No label pattern or template matches, but a tax keyword and a
        // plausible number share a line.
        let input = DocumentInput::text(
            "combined duty and tax due for shipment 45.60",
            "customs.txt",
            TaxCategory::Purchases,
        );
        let report = pipeline().process_document(&input);
        assert!(report.success);
        assert_eq!(report.method, ExtractionMethod::DeepScan);
        assert_eq!(report.purchase_tax, vec![d("45.60")]);
        assert!(report.requires_manual_review);
    }

    #[test]
    fn test_template_used_when_patterns_miss() {
        let text = "INVOICE 2024-117\nNet\n100.00\nVAT\n23.00\nTotal\n123.00";
        let input = DocumentInput::text(text, "scan.txt", TaxCategory::Purchases);
        let report = pipeline().process_document(&input);
        assert!(report.success);
        assert_eq!(report.method, ExtractionMethod::TemplateMatch);
        assert_eq!(report.purchase_tax, vec![d("23.00")]);
    }

    #[test]
    fn test_confidence_always_in_unit_range() {
        for text in [
            "Total Amount VAT: €134.96",
            "VAT @ 23%: €41.40\nVAT @ 13.5%: €27.00\nTotal VAT: €68.40",
            "",
            "tax 0.01",
        ] {
            let input = DocumentInput::text(text, "doc.txt", TaxCategory::Sales);
            let report = pipeline().process_document(&input);
            assert!((0.0..=1.0).contains(&report.confidence), "text: {text:?}");
        }
    }

    #[test]
    fn test_processing_is_deterministic() {
        let input = DocumentInput::text(
            "Total Amount VAT: €134.96\nVAT @ 23%: €41.40",
            "doc.txt",
            TaxCategory::Purchases,
        );
        let a = pipeline().process_document(&input);
        let b = pipeline().process_document(&input);
        assert_eq!(a.purchase_tax, b.purchase_tax);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.method, b.method);
    }

    #[test]
    fn test_audit_summary_from_report() {
        let input = DocumentInput::text(
            "Total Amount VAT: €134.96",
            "invoice.txt",
            TaxCategory::Purchases,
        );
        let report = pipeline().process_document(&input);
        let summary = AuditSummary::from_report(&report);
        assert_eq!(summary.method, ExtractionMethod::TextPattern);
        assert_eq!(summary.total_purchase_tax, d("134.96"));
        assert!(!summary.requires_manual_review);

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"method\":\"text_pattern\""));
        assert!(json.contains("timestamp"));
    }
}
