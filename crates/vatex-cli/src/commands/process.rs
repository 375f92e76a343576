//! Process command - extract VAT amounts from a single document file.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use tracing::{debug, info};

use vatex_core::{
    DocumentInput, ExtractionPipeline, ExtractionReport, Grid, TaxCategory, VatexConfig,
};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (plain text or CSV spreadsheet export)
    #[arg(required = true)]
    input: PathBuf,

    /// Ledger side of the document
    #[arg(short = 'C', long, value_enum, default_value = "purchases")]
    category: CategoryArg,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Show extraction confidence and timing
    #[arg(long)]
    show_confidence: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum CategoryArg {
    Sales,
    Purchases,
}

impl From<CategoryArg> for TaxCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Sales => TaxCategory::Sales,
            CategoryArg::Purchases => TaxCategory::Purchases,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// Full report as JSON
    Json,
    /// One-row CSV summary
    Csv,
    /// Plain text summary
    Text,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pipeline = ExtractionPipeline::new(config)?;
    let report = process_file(&pipeline, &args.input, args.category.into())?;

    let output = format_report(&report, args.format)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{output}");
    }

    if report.requires_manual_review {
        eprintln!(
            "{} {}",
            style("!").yellow(),
            style(&report.user_message).yellow()
        );
    }

    if args.show_confidence {
        println!();
        println!(
            "{} Extraction confidence: {:.1}%",
            style("ℹ").blue(),
            report.confidence * 100.0
        );
        println!(
            "{} Processing time: {}ms",
            style("ℹ").blue(),
            report.processing_time_ms
        );
    }

    Ok(())
}

pub fn load_config(config_path: Option<&str>) -> anyhow::Result<VatexConfig> {
    match config_path {
        Some(path) => Ok(VatexConfig::from_file(Path::new(path))?),
        None => Ok(VatexConfig::default()),
    }
}

/// Process one file: CSV inputs become a grid, everything else is
/// treated as plain text.
pub fn process_file(
    pipeline: &ExtractionPipeline,
    path: &Path,
    category: TaxCategory,
) -> anyhow::Result<ExtractionReport> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let content = fs::read_to_string(path)?;

    let report = if extension == "csv" {
        let grid = read_grid(&content)?;
        debug!(
            headers = grid.headers.len(),
            rows = grid.rows.len(),
            "parsed CSV grid"
        );
        let mut input = DocumentInput::text(&content, file_name, category);
        input.grid = Some(&grid);
        pipeline.process_document(&input)
    } else {
        let input = DocumentInput::text(&content, file_name, category);
        pipeline.process_document(&input)
    };

    Ok(report)
}

/// Parse CSV content into the header row + cell grid the core expects.
pub fn read_grid(content: &str) -> anyhow::Result<Grid> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|c| c.trim().to_string()).collect());
    }
    Ok(Grid::new(headers, rows))
}

pub fn format_report(report: &ExtractionReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Csv => format_csv(report),
        OutputFormat::Text => Ok(format_text(report)),
    }
}

fn format_csv(report: &ExtractionReport) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "success",
        "method",
        "confidence",
        "sales_tax_total",
        "purchase_tax_total",
        "requires_manual_review",
        "issue_count",
    ])?;

    let sales_total: rust_decimal::Decimal = report.sales_tax.iter().sum();
    let purchase_total: rust_decimal::Decimal = report.purchase_tax.iter().sum();
    wtr.write_record([
        &report.success.to_string(),
        &report.method.to_string(),
        &format!("{:.2}", report.confidence),
        &sales_total.to_string(),
        &purchase_total.to_string(),
        &report.requires_manual_review.to_string(),
        &report.issues.len().to_string(),
    ])?;

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(report: &ExtractionReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("Method: {}\n", report.method));
    output.push_str(&format!("Confidence: {:.1}%\n", report.confidence * 100.0));
    output.push('\n');

    if !report.sales_tax.is_empty() {
        output.push_str("Sales tax:\n");
        for amount in &report.sales_tax {
            output.push_str(&format!("  {amount} EUR\n"));
        }
    }
    if !report.purchase_tax.is_empty() {
        output.push_str("Purchase tax:\n");
        for amount in &report.purchase_tax {
            output.push_str(&format!("  {amount} EUR\n"));
        }
    }

    if !report.issues.is_empty() {
        output.push('\n');
        output.push_str("Issues:\n");
        for issue in &report.issues {
            output.push_str(&format!("  [{:?}] {}\n", issue.severity, issue.message));
        }
    }

    output.push('\n');
    output.push_str(&report.user_message);
    output.push('\n');

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_read_grid_from_csv() {
        let csv = "Country,Net Total Tax\nIreland,7.55\nUK,40.76\n";
        let grid = read_grid(csv).unwrap();
        assert_eq!(grid.headers, vec!["Country", "Net Total Tax"]);
        assert_eq!(grid.rows.len(), 2);
        assert_eq!(grid.rows[0], vec!["Ireland", "7.55"]);
    }

    #[test]
    fn test_read_grid_tolerates_ragged_rows() {
        let csv = "Country,Net Total Tax\nIreland\n";
        let grid = read_grid(csv).unwrap();
        assert_eq!(grid.rows[0], vec!["Ireland"]);
    }

    #[test]
    fn test_csv_document_goes_through_spreadsheet_path() {
        let pipeline = ExtractionPipeline::new(VatexConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        fs::write(&path, "Country,Net Total Tax\nIreland,7.55\n").unwrap();

        let report = process_file(&pipeline, &path, TaxCategory::Sales).unwrap();
        assert!(report.success);
        assert_eq!(report.sales_tax, vec![Decimal::from_str("7.55").unwrap()]);
    }

    #[test]
    fn test_text_document_goes_through_pattern_path() {
        let pipeline = ExtractionPipeline::new(VatexConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.txt");
        fs::write(&path, "Total Amount VAT: €134.96\n").unwrap();

        let report = process_file(&pipeline, &path, TaxCategory::Purchases).unwrap();
        assert!(report.success);
        assert_eq!(
            report.purchase_tax,
            vec![Decimal::from_str("134.96").unwrap()]
        );
    }

    #[test]
    fn test_csv_summary_row() {
        let pipeline = ExtractionPipeline::new(VatexConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.txt");
        fs::write(&path, "Total Amount VAT: €134.96\n").unwrap();
        let report = process_file(&pipeline, &path, TaxCategory::Purchases).unwrap();

        let csv = format_csv(&report).unwrap();
        assert!(csv.contains("text_pattern"));
        assert!(csv.contains("134.96"));
    }
}
