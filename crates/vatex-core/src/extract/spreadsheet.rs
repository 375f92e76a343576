//! Spreadsheet grid aggregation.
//!
//! Operates on a header row plus 2-D cell grid produced by any reader.
//! Three aggregation paths: country-summary exports (with the
//! anti-double-counting subtotal selection), order-detail exports, and a
//! generic tax-column scan.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::debug;

use crate::error::AggregationError;
use crate::models::{DocumentType, ExtractedAmounts, HeuristicConfig, PatternTier, TaxCategory};

use super::patterns::{parse_amount, round2};

/// Header row + data rows, as handed over by a grid reader collaborator.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Grid {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }
}

/// Detected export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridFormat {
    CountrySummary,
    OrderDetail,
    Generic,
}

/// Column-name keywords, in ranking order for the generic path.
const COLUMN_PRIORITY: &[&str] = &[
    "net total tax",
    "shipping tax",
    "item tax",
    "order tax",
    "tax",
    "vat",
];

/// Cells containing one of these mark a per-country subtotal row.
const SUBTOTAL_KEYWORDS: &[&str] = &["subtotal", "total", "summary"];

pub struct SpreadsheetAggregator {
    heuristics: HeuristicConfig,
}

impl SpreadsheetAggregator {
    pub fn new(heuristics: HeuristicConfig) -> Self {
        Self { heuristics }
    }

    /// Detect the export format from header keywords.
    pub fn detect_format(&self, grid: &Grid) -> GridFormat {
        let has_net_total = find_column(grid, "net total tax").is_some();
        let has_country = find_column(grid, "country").is_some();
        if has_net_total && has_country {
            return GridFormat::CountrySummary;
        }

        let has_per_order_tax =
            find_column(grid, "shipping tax").is_some() || find_column(grid, "item tax").is_some();
        let has_order_id = find_column(grid, "order").is_some();
        if has_per_order_tax && has_order_id {
            return GridFormat::OrderDetail;
        }

        GridFormat::Generic
    }

    /// Aggregate the grid into an extraction result.
    pub fn aggregate(
        &self,
        grid: &Grid,
        category: TaxCategory,
    ) -> Result<ExtractedAmounts, AggregationError> {
        if grid.headers.is_empty() {
            return Err(AggregationError::NoHeaders);
        }
        let format = self.detect_format(grid);
        debug!(?format, rows = grid.rows.len(), "aggregating grid");
        match format {
            GridFormat::CountrySummary => self.aggregate_country_summary(grid, category),
            GridFormat::OrderDetail => self.aggregate_order_detail(grid, category),
            GridFormat::Generic => self.aggregate_generic(grid, category),
        }
    }

    /// Country-summary exports interleave per-country subtotal rows with
    /// that country's transaction rows; naive column summation double
    /// counts. Only one subtotal per country is kept:
    /// single row, else keyword-marked row, else a dominant largest
    /// value, else the largest value.
    fn aggregate_country_summary(
        &self,
        grid: &Grid,
        category: TaxCategory,
    ) -> Result<ExtractedAmounts, AggregationError> {
        let tax_col = find_column(grid, "net total tax")
            .ok_or_else(|| AggregationError::NoTaxColumn(grid.headers.join(", ")))?;
        let country_col = find_column(grid, "country")
            .ok_or_else(|| AggregationError::NoTaxColumn(grid.headers.join(", ")))?;

        // Positive tax values grouped by country, tracking whether the
        // source row carried a subtotal keyword.
        let mut by_country: BTreeMap<String, Vec<(Decimal, bool)>> = BTreeMap::new();
        for (idx, row) in grid.rows.iter().enumerate() {
            let Some(country) = grid.cell(idx, country_col) else {
                continue;
            };
            let Some(value) = grid.cell(idx, tax_col).and_then(parse_amount) else {
                continue;
            };
            if value <= Decimal::ZERO {
                continue;
            }
            let keyword_row = row.iter().any(|cell| {
                let lower = cell.to_lowercase();
                SUBTOTAL_KEYWORDS.iter().any(|k| lower.contains(k))
            });
            by_country
                .entry(country.trim().to_string())
                .or_default()
                .push((round2(value), keyword_row));
        }

        let mut result = ExtractedAmounts::new(DocumentType::Other);
        for (country, values) in &by_country {
            let (subtotal, guessed) = self.select_country_subtotal(values);
            debug!(country = country.as_str(), %subtotal, guessed, "country subtotal selected");
            if guessed {
                // Neither a keyword row nor a dominant value identified
                // the subtotal, so the largest value is a guess.
                result.add_flag("SUBTOTAL_HEURISTIC_FALLBACK");
            }
            result.push_amount(
                category,
                subtotal,
                "country_subtotal_only",
                PatternTier::Aggregate,
                0.8,
            );
        }
        Ok(finish(result, 0.8))
    }

    /// Returns the chosen subtotal and whether it was only a guess.
    fn select_country_subtotal(&self, values: &[(Decimal, bool)]) -> (Decimal, bool) {
        if values.len() == 1 {
            return (values[0].0, false);
        }
        if let Some((value, _)) = values.iter().find(|(_, keyword)| *keyword) {
            return (*value, false);
        }
        let largest = values.iter().map(|(v, _)| *v).max().unwrap_or_default();
        let rest: Decimal = values
            .iter()
            .map(|(v, _)| *v)
            .filter(|v| *v != largest)
            .sum();
        let ratio = Decimal::try_from(self.heuristics.subtotal_dominance_ratio)
            .unwrap_or(Decimal::new(15, 1));
        (largest, largest <= rest * ratio)
    }

    /// Order-detail exports have one row per order, so every tax column
    /// sums independently with no subtotal logic.
    fn aggregate_order_detail(
        &self,
        grid: &Grid,
        category: TaxCategory,
    ) -> Result<ExtractedAmounts, AggregationError> {
        let mut result = ExtractedAmounts::new(DocumentType::Other);
        let mut found = false;
        for keyword in ["shipping tax", "item tax", "order tax"] {
            let Some(col) = find_column(grid, keyword) else {
                continue;
            };
            let sum = column_sum(grid, col);
            if sum > Decimal::ZERO {
                found = true;
                result.push_amount(
                    category,
                    sum,
                    "order_detail_sum",
                    PatternTier::Aggregate,
                    0.8,
                );
            }
        }
        if !found {
            return Err(AggregationError::NoTaxColumn(grid.headers.join(", ")));
        }
        Ok(finish(result, 0.8))
    }

    /// Generic fallback: sum every tax-like column, ranked by the fixed
    /// priority list so the most specific column reports first.
    fn aggregate_generic(
        &self,
        grid: &Grid,
        category: TaxCategory,
    ) -> Result<ExtractedAmounts, AggregationError> {
        let mut result = ExtractedAmounts::new(DocumentType::Other);
        let mut taken: Vec<usize> = Vec::new();
        for keyword in COLUMN_PRIORITY {
            for (col, header) in grid.headers.iter().enumerate() {
                if taken.contains(&col) || !header.to_lowercase().contains(keyword) {
                    continue;
                }
                taken.push(col);
                let sum = column_sum(grid, col);
                if sum > Decimal::ZERO {
                    result.push_amount(
                        category,
                        sum,
                        "generic_column_sum",
                        PatternTier::Aggregate,
                        0.65,
                    );
                }
            }
        }
        if taken.is_empty() {
            return Err(AggregationError::NoTaxColumn(grid.headers.join(", ")));
        }
        Ok(finish(result, 0.65))
    }
}

impl Default for SpreadsheetAggregator {
    fn default() -> Self {
        Self::new(HeuristicConfig::default())
    }
}

fn finish(mut result: ExtractedAmounts, confidence: f32) -> ExtractedAmounts {
    if result.is_empty() {
        result.set_confidence(0.0);
    } else {
        result.set_confidence(confidence);
    }
    result
}

/// Case-insensitive substring match over headers.
fn find_column(grid: &Grid, keyword: &str) -> Option<usize> {
    grid.headers
        .iter()
        .position(|h| h.to_lowercase().contains(keyword))
}

/// Sum of positive parseable values in a column; blanks, negatives and
/// short rows are skipped.
fn column_sum(grid: &Grid, col: usize) -> Decimal {
    let sum: Decimal = grid
        .rows
        .iter()
        .filter_map(|row| row.get(col))
        .filter_map(|cell| parse_amount(cell))
        .filter(|v| *v > Decimal::ZERO)
        .sum();
    round2(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    /// Country-summary export with interleaved subtotal and transaction
    /// rows. Expected country subtotals: Ireland 7.55, UK 40.76,
    /// Germany 5333.62, France 58.37, Spain 14.26, Italy 20.68.
    fn country_fixture() -> Grid {
        Grid::new(
            row(&["Country", "Order ID", "Description", "Net Total Tax"]),
            vec![
                // Ireland: single row, taken as the subtotal.
                row(&["Ireland", "IE-1", "Domestic sales", "7.55"]),
                // UK: keyword row wins over the transaction rows.
                row(&["UK", "", "UK Subtotal", "40.76"]),
                row(&["UK", "UK-1", "Order", "25.00"]),
                row(&["UK", "UK-2", "Order", "15.76"]),
                // Germany: dominant largest value wins.
                row(&["Germany", "", "", "5333.62"]),
                row(&["Germany", "DE-1", "Order", "10.00"]),
                row(&["Germany", "DE-2", "Order", "5.50"]),
                // France: keyword row.
                row(&["France", "", "Total", "58.37"]),
                row(&["France", "FR-1", "Order", "30.00"]),
                row(&["France", "FR-2", "Order", "28.37"]),
                // Spain: 14.26 > 1.5 x 9.00, dominance applies.
                row(&["Spain", "ES-1", "Order", "14.26"]),
                row(&["Spain", "ES-2", "Order", "9.00"]),
                // Italy: no keyword, no dominance, largest wins.
                row(&["Italy", "IT-1", "Order", "20.68"]),
                row(&["Italy", "IT-2", "Order", "15.00"]),
                row(&["Italy", "IT-3", "Order", "13.00"]),
            ],
        )
    }

    #[test]
    fn test_country_summary_sums_subtotals_only() {
        let aggregator = SpreadsheetAggregator::default();
        let grid = country_fixture();
        assert_eq!(aggregator.detect_format(&grid), GridFormat::CountrySummary);

        let result = aggregator.aggregate(&grid, TaxCategory::Sales).unwrap();
        assert_eq!(result.total_tax(), d("5475.24"));
        assert_eq!(result.sales_tax.len(), 6);
        // Italy's subtotal had no keyword and no dominant value.
        assert!(result
            .validation_flags
            .contains("SUBTOTAL_HEURISTIC_FALLBACK"));
        assert!(result.provenance_consistent());
        assert!(result
            .provenance
            .iter()
            .all(|p| p.source_pattern == "country_subtotal_only"));
    }

    #[test]
    fn test_country_summary_ignores_naive_row_sum() {
        let aggregator = SpreadsheetAggregator::default();
        let result = aggregator
            .aggregate(&country_fixture(), TaxCategory::Sales)
            .unwrap();
        let naive: Decimal = country_fixture()
            .rows
            .iter()
            .filter_map(|r| parse_amount(&r[3]))
            .sum();
        assert!(naive > result.total_tax());
    }

    #[test]
    fn test_order_detail_sums_all_rows() {
        let grid = Grid::new(
            row(&["Order ID", "Shipping Tax", "Item Tax", "Order Tax"]),
            vec![
                row(&["1001", "1.50", "4.60", "6.10"]),
                row(&["1002", "2.00", "9.20", "11.20"]),
                row(&["1003", "0.00", "2.30", "2.30"]),
            ],
        );
        let aggregator = SpreadsheetAggregator::default();
        assert_eq!(aggregator.detect_format(&grid), GridFormat::OrderDetail);

        let result = aggregator.aggregate(&grid, TaxCategory::Purchases).unwrap();
        // shipping 3.50 + item 16.10 + order 19.60
        assert_eq!(result.purchase_tax, vec![d("3.50"), d("16.10"), d("19.60")]);
        assert_eq!(result.total_tax(), d("39.20"));
    }

    #[test]
    fn test_generic_ranks_columns_by_priority() {
        let grid = Grid::new(
            row(&["Description", "VAT", "Order Tax"]),
            vec![
                row(&["a", "2.00", "5.00"]),
                row(&["b", "3.00", "5.00"]),
            ],
        );
        let aggregator = SpreadsheetAggregator::default();
        assert_eq!(aggregator.detect_format(&grid), GridFormat::Generic);

        let result = aggregator.aggregate(&grid, TaxCategory::Sales).unwrap();
        // "order tax" outranks generic "vat"
        assert_eq!(result.sales_tax, vec![d("10.00"), d("5.00")]);
    }

    #[test]
    fn test_no_headers_is_an_error() {
        let grid = Grid::default();
        let err = SpreadsheetAggregator::default()
            .aggregate(&grid, TaxCategory::Sales)
            .unwrap_err();
        assert!(matches!(err, AggregationError::NoHeaders));
    }

    #[test]
    fn test_no_tax_column_is_an_error() {
        let grid = Grid::new(
            row(&["Name", "Quantity"]),
            vec![row(&["widget", "3"])],
        );
        let err = SpreadsheetAggregator::default()
            .aggregate(&grid, TaxCategory::Sales)
            .unwrap_err();
        assert!(matches!(err, AggregationError::NoTaxColumn(_)));
    }

    #[test]
    fn test_blank_and_negative_cells_skipped() {
        let grid = Grid::new(
            row(&["Country", "Net Total Tax"]),
            vec![
                row(&["Ireland", "7.55"]),
                row(&["Ireland"]),
                row(&["UK", "-3.00"]),
                row(&["UK", "n/a"]),
            ],
        );
        let result = SpreadsheetAggregator::default()
            .aggregate(&grid, TaxCategory::Sales)
            .unwrap();
        assert_eq!(result.total_tax(), d("7.55"));
    }
}
