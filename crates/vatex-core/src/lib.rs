//! Core library for VAT amount extraction from business documents.
//!
//! This crate provides:
//! - Tiered regex pattern extraction over plain text
//! - Spreadsheet grid aggregation with anti-double-counting
//! - Jurisdiction compliance validation (Irish rules by default)
//! - Weighted quality scoring and confidence boosting
//! - Cross-validation of independent extraction attempts
//! - A multi-strategy pipeline that degrades to manual review instead
//!   of failing

pub mod audit;
pub mod crossval;
pub mod error;
pub mod extract;
pub mod models;
pub mod pipeline;
pub mod quality;
pub mod validate;

pub use audit::{AuditSink, NullSink, TracingSink};
pub use crossval::{Candidate, CrossValidationEngine};
pub use error::{AggregationError, Result, VatexError, VisionError};
pub use extract::{Grid, GridFormat, SpreadsheetAggregator, TextExtractor};
pub use models::{
    ConflictResolution, CrossValidationResult, DocumentType, ExtractedAmounts, ExtractionMethod,
    Issue, IssueCode, IssueSeverity, PatternTier, QualityAssessment, TaxCategory,
    ValidationResult, VatexConfig,
};
pub use pipeline::{
    AuditSummary, DocumentInput, ExtractionPipeline, ExtractionReport, ResilientVision,
    TemplateLibrary, VisionService,
};
pub use quality::{QualityScorer, ScoringContext};
pub use validate::{ComplianceValidator, DocumentFacts};
