//! Data models moving through the extraction pipeline.

pub mod amounts;
pub mod assessment;
pub mod config;

pub use amounts::{DocumentType, ExtractedAmounts, PatternTier, Provenance, TaxCategory};
pub use assessment::{
    AmountStatistics, ConflictResolution, CrossValidationResult, ExtractionMethod, Issue,
    IssueCode, IssueSeverity, QualityAssessment, QualityFactors, ValidationResult,
};
pub use config::{HeuristicConfig, JurisdictionConfig, PipelineConfig, VatexConfig};
