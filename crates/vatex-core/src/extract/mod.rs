//! Extraction engines: tiered text patterns and spreadsheet aggregation.

pub mod classify;
pub mod patterns;
pub mod spreadsheet;
pub mod text;

pub use classify::{classify, Classification};
pub use patterns::{parse_amount, rate_for_code, round2};
pub use spreadsheet::{Grid, GridFormat, SpreadsheetAggregator};
pub use text::TextExtractor;
