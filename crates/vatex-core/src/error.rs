//! Error types for the vatex-core library.

use thiserror::Error;

/// Main error type for the vatex library.
#[derive(Error, Debug)]
pub enum VatexError {
    /// Spreadsheet aggregation error.
    #[error("aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    /// Vision collaborator error.
    #[error("vision error: {0}")]
    Vision(#[from] VisionError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to spreadsheet grid aggregation.
#[derive(Error, Debug)]
pub enum AggregationError {
    /// The grid has no header row.
    #[error("grid has no headers")]
    NoHeaders,

    /// No tax-like column could be found in the headers.
    #[error("no tax column found in headers: {0}")]
    NoTaxColumn(String),
}

/// Errors reported by the external vision/AI collaborator.
///
/// The collaborator owns its own network I/O and timeout; the pipeline
/// only distinguishes "took too long" from "not usable" to pick the
/// right issue code before falling through to the next strategy.
#[derive(Error, Debug)]
pub enum VisionError {
    /// The service is unreachable or returned an unusable response.
    #[error("vision service unavailable: {0}")]
    Unavailable(String),

    /// The service did not answer within its deadline.
    #[error("vision service timed out after {0}ms")]
    Timeout(u64),
}

/// Result type for the vatex library.
pub type Result<T> = std::result::Result<T, VatexError>;
