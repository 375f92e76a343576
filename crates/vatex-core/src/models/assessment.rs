//! Assessment types produced by the validator, scorer, and
//! cross-validation engine. All of them are derived views: they never
//! mutate the [`ExtractedAmounts`](super::amounts::ExtractedAmounts)
//! they were computed from.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::amounts::ExtractedAmounts;

/// How an extraction result was produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Cross-validated agreement between vision and pattern extraction.
    Enhanced,
    /// External vision/AI collaborator.
    VisionAi,
    /// Spreadsheet grid aggregation.
    SpreadsheetParser,
    /// Tiered regex pattern extraction over plain text.
    TextPattern,
    /// Known-layout template match.
    TemplateMatch,
    /// Last-resort keyword + plausible-number scan.
    DeepScan,
    #[default]
    Unknown,
}

impl ExtractionMethod {
    /// Base reliability score (0-100) used by the quality scorer.
    pub fn reliability_base(&self) -> f32 {
        match self {
            ExtractionMethod::Enhanced => 95.0,
            ExtractionMethod::VisionAi => 85.0,
            ExtractionMethod::SpreadsheetParser => 80.0,
            ExtractionMethod::TextPattern | ExtractionMethod::TemplateMatch => 65.0,
            ExtractionMethod::DeepScan | ExtractionMethod::Unknown => 50.0,
        }
    }

    /// Weight bonus used by the cross-validation engine.
    pub fn weight_bonus(&self) -> f32 {
        match self {
            ExtractionMethod::Enhanced | ExtractionMethod::VisionAi => 0.2,
            ExtractionMethod::SpreadsheetParser => 0.15,
            ExtractionMethod::TextPattern | ExtractionMethod::TemplateMatch => 0.1,
            ExtractionMethod::DeepScan => -0.2,
            ExtractionMethod::Unknown => 0.0,
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExtractionMethod::Enhanced => "enhanced",
            ExtractionMethod::VisionAi => "vision_ai",
            ExtractionMethod::SpreadsheetParser => "spreadsheet_parser",
            ExtractionMethod::TextPattern => "text_pattern",
            ExtractionMethod::TemplateMatch => "template_match",
            ExtractionMethod::DeepScan => "deep_scan",
            ExtractionMethod::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Ordered issue severity. `Ord` matters: validation gates compare
/// against [`IssueSeverity::High`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Machine-readable issue codes shared across the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    TextExtractionFailed,
    NoTaxFound,
    NegativeAmount,
    RateNotInJurisdictionSet,
    TotalMismatch,
    DuplicateAmounts,
    VisionServiceUnavailable,
    ProcessingTimeout,
    InvalidTaxId,
    CurrencyMismatch,
    MixedTaxCategories,
    RoundNumbersOnly,
    LineItemMismatch,
    ZeroTaxTotal,
    LowConfidence,
}

impl IssueCode {
    /// Default severity for the code. Individual issues may override.
    pub fn default_severity(&self) -> IssueSeverity {
        match self {
            IssueCode::NoTaxFound | IssueCode::NegativeAmount => IssueSeverity::Critical,
            IssueCode::TextExtractionFailed
            | IssueCode::TotalMismatch
            | IssueCode::ZeroTaxTotal => IssueSeverity::High,
            IssueCode::RateNotInJurisdictionSet
            | IssueCode::DuplicateAmounts
            | IssueCode::VisionServiceUnavailable
            | IssueCode::ProcessingTimeout
            | IssueCode::InvalidTaxId
            | IssueCode::CurrencyMismatch
            | IssueCode::LineItemMismatch
            | IssueCode::LowConfidence => IssueSeverity::Medium,
            IssueCode::MixedTaxCategories | IssueCode::RoundNumbersOnly => IssueSeverity::Low,
        }
    }

    /// Flag string stored in `ExtractedAmounts::validation_flags`.
    pub fn as_flag(&self) -> &'static str {
        match self {
            IssueCode::TextExtractionFailed => "TEXT_EXTRACTION_FAILED",
            IssueCode::NoTaxFound => "NO_TAX_FOUND",
            IssueCode::NegativeAmount => "NEGATIVE_AMOUNT",
            IssueCode::RateNotInJurisdictionSet => "RATE_NOT_IN_JURISDICTION_SET",
            IssueCode::TotalMismatch => "TOTAL_MISMATCH",
            IssueCode::DuplicateAmounts => "DUPLICATE_AMOUNTS",
            IssueCode::VisionServiceUnavailable => "VISION_SERVICE_UNAVAILABLE",
            IssueCode::ProcessingTimeout => "PROCESSING_TIMEOUT",
            IssueCode::InvalidTaxId => "INVALID_TAX_ID",
            IssueCode::CurrencyMismatch => "CURRENCY_MISMATCH",
            IssueCode::MixedTaxCategories => "MIXED_TAX_CATEGORIES",
            IssueCode::RoundNumbersOnly => "ROUND_NUMBERS_ONLY",
            IssueCode::LineItemMismatch => "LINE_ITEM_MISMATCH",
            IssueCode::ZeroTaxTotal => "ZERO_TAX_TOTAL",
            IssueCode::LowConfidence => "LOW_CONFIDENCE",
        }
    }
}

/// A single finding raised by validation or scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub code: IssueCode,
    pub message: String,
    /// Human-readable consequence ("blocks auto-acceptance", ...).
    pub impact: String,
}

impl Issue {
    pub fn new(code: IssueCode, message: impl Into<String>, impact: impl Into<String>) -> Self {
        Self {
            severity: code.default_severity(),
            code,
            message: message.into(),
            impact: impact.into(),
        }
    }

    pub fn with_severity(mut self, severity: IssueSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// Outcome of jurisdiction/compliance validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Block auto-acceptance when severity reaches High.
    pub errors: Vec<Issue>,
    /// Reduce confidence but never block.
    pub warnings: Vec<Issue>,
    /// Free-text hints for a reviewer.
    pub suggestions: Vec<String>,
}

impl ValidationResult {
    /// True iff no error of severity High or above was raised.
    pub fn is_valid(&self) -> bool {
        !self
            .errors
            .iter()
            .any(|e| e.severity >= IssueSeverity::High)
    }

    pub fn has_critical(&self) -> bool {
        self.all_issues()
            .any(|i| i.severity == IssueSeverity::Critical)
    }

    pub fn all_issues(&self) -> impl Iterator<Item = &Issue> {
        self.errors.iter().chain(self.warnings.iter())
    }

    pub fn push_error(&mut self, issue: Issue) {
        self.errors.push(issue);
    }

    pub fn push_warning(&mut self, issue: Issue) {
        self.warnings.push(issue);
    }
}

/// The five named quality factors, each 0-100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityFactors {
    pub amount_quality: f32,
    pub structure: f32,
    pub compliance: f32,
    pub reliability: f32,
    pub consistency: f32,
}

impl QualityFactors {
    /// Weighted blend producing the overall 0-100 score.
    pub fn overall(&self) -> f32 {
        let overall = 0.30 * self.amount_quality
            + 0.20 * self.structure
            + 0.25 * self.compliance
            + 0.15 * self.reliability
            + 0.10 * self.consistency;
        overall.clamp(0.0, 100.0)
    }
}

/// Derived quality view over an extraction result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub overall_score: f32,
    /// Multiplier applied to extraction confidence, within [0.5, 1.3].
    pub confidence_boost: f32,
    pub compliant: bool,
    pub factors: QualityFactors,
    pub issues: Vec<Issue>,
}

impl QualityAssessment {
    pub fn critical_issues(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Critical)
            .count()
    }
}

/// How conflicting extraction attempts were reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    Consensus,
    WeightedAverage,
    Primary,
    ManualReview,
}

/// Summary statistics over the union of amounts from all attempts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmountStatistics {
    pub mean: Decimal,
    pub median: Decimal,
    pub std_dev: f64,
    pub outliers: Vec<Decimal>,
}

/// Reconciliation of N >= 2 independent extraction attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationResult {
    /// Fraction of cross-method amount comparisons matching within
    /// tolerance, in [0, 1].
    pub agreement: f32,
    pub primary: ExtractedAmounts,
    pub alternatives: Vec<ExtractedAmounts>,
    pub resolution: ConflictResolution,
    pub statistics: AmountStatistics,
    /// Combined confidence for the reconciled result, in [0.1, 0.98].
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(IssueSeverity::Critical > IssueSeverity::High);
        assert!(IssueSeverity::High > IssueSeverity::Medium);
        assert!(IssueSeverity::Medium > IssueSeverity::Low);
    }

    #[test]
    fn test_is_valid_gated_on_high_severity() {
        let mut result = ValidationResult::default();
        result.push_error(
            Issue::new(IssueCode::InvalidTaxId, "malformed tax ID", "review tax ID")
                .with_severity(IssueSeverity::Medium),
        );
        assert!(result.is_valid());

        result.push_error(Issue::new(
            IssueCode::NegativeAmount,
            "negative tax amount",
            "blocks auto-acceptance",
        ));
        assert!(!result.is_valid());
        assert!(result.has_critical());
    }

    #[test]
    fn test_warnings_never_block() {
        let mut result = ValidationResult::default();
        result.push_warning(Issue::new(
            IssueCode::MixedTaxCategories,
            "both sales and purchase tax present",
            "verify document type",
        ));
        assert!(result.is_valid());
    }

    #[test]
    fn test_issue_codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&IssueCode::NoTaxFound).unwrap();
        assert_eq!(json, "\"NO_TAX_FOUND\"");
        assert_eq!(IssueCode::NoTaxFound.as_flag(), "NO_TAX_FOUND");
    }

    #[test]
    fn test_overall_is_weighted_blend() {
        let factors = QualityFactors {
            amount_quality: 100.0,
            structure: 100.0,
            compliance: 100.0,
            reliability: 100.0,
            consistency: 100.0,
        };
        assert!((factors.overall() - 100.0).abs() < 0.001);

        let factors = QualityFactors {
            amount_quality: 100.0,
            structure: 0.0,
            compliance: 0.0,
            reliability: 0.0,
            consistency: 0.0,
        };
        assert!((factors.overall() - 30.0).abs() < 0.001);
    }

    #[test]
    fn test_method_reliability_table() {
        assert_eq!(ExtractionMethod::Enhanced.reliability_base(), 95.0);
        assert_eq!(ExtractionMethod::VisionAi.reliability_base(), 85.0);
        assert_eq!(ExtractionMethod::SpreadsheetParser.reliability_base(), 80.0);
        assert_eq!(ExtractionMethod::TextPattern.reliability_base(), 65.0);
        assert_eq!(ExtractionMethod::Unknown.reliability_base(), 50.0);
    }
}
