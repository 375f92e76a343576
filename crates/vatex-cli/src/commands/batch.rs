//! Batch processing command for multiple document files.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use vatex_core::{ExtractionPipeline, ExtractionReport, TaxCategory};

use super::process::{self, CategoryArg, OutputFormat};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Ledger side applied to every document
    #[arg(short = 'C', long, value_enum, default_value = "purchases")]
    category: CategoryArg,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers (0 = use configured batch size)
    #[arg(short = 'j', long, default_value = "0")]
    jobs: usize,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

/// Result of processing a single file.
struct BatchResult {
    path: PathBuf,
    report: Option<ExtractionReport>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = process::load_config(config_path)?;

    // Expand glob pattern
    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            matches!(ext.to_lowercase().as_str(), "txt" | "text" | "csv")
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    // Set up progress bars
    let multi_progress = MultiProgress::new();
    let overall_pb = multi_progress.add(ProgressBar::new(files.len() as u64));
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
            .unwrap()
            .progress_chars("=>-"),
    );

    let window = if args.jobs > 0 {
        args.jobs
    } else {
        config.pipeline.batch_size.max(1)
    };
    let pause = Duration::from_millis(config.pipeline.batch_pause_ms);

    let pipeline = Arc::new(ExtractionPipeline::new(config)?);
    let category: TaxCategory = args.category.into();

    // Process files in bounded windows with a pause between windows so
    // a metered vision backend is not hammered.
    let mut results = Vec::with_capacity(files.len());
    for (window_idx, chunk) in files.chunks(window).enumerate() {
        if window_idx > 0 && !pause.is_zero() {
            debug!(pause_ms = pause.as_millis() as u64, "pausing between batches");
            tokio::time::sleep(pause).await;
        }

        let mut handles = Vec::with_capacity(chunk.len());
        for path in chunk {
            let pipeline = Arc::clone(&pipeline);
            let path = path.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let file_start = Instant::now();
                let outcome = process::process_file(&pipeline, &path, category);
                let processing_time_ms = file_start.elapsed().as_millis() as u64;
                (path, outcome, processing_time_ms)
            }));
        }

        for handle in handles {
            let (path, outcome, processing_time_ms) = handle.await?;
            match outcome {
                Ok(report) => {
                    results.push(BatchResult {
                        path,
                        report: Some(report),
                        error: None,
                        processing_time_ms,
                    });
                }
                Err(e) => {
                    let error_msg = e.to_string();
                    if args.continue_on_error {
                        warn!("Failed to process {}: {}", path.display(), error_msg);
                        results.push(BatchResult {
                            path,
                            report: None,
                            error: Some(error_msg),
                            processing_time_ms,
                        });
                    } else {
                        error!("Failed to process {}: {}", path.display(), error_msg);
                        anyhow::bail!("Processing failed: {}", error_msg);
                    }
                }
            }
            overall_pb.inc(1);
        }
    }

    overall_pb.finish_with_message("Complete");

    // Write per-file outputs
    let successful: Vec<_> = results.iter().filter(|r| r.report.is_some()).collect();
    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
    let needs_review = successful
        .iter()
        .filter(|r| r.report.as_ref().is_some_and(|rep| rep.requires_manual_review))
        .count();

    for result in &successful {
        if let (Some(report), Some(output_dir)) = (&result.report, &args.output_dir) {
            let output_name = result
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("document");

            let extension = match args.format {
                OutputFormat::Json => "json",
                OutputFormat::Csv => "csv",
                OutputFormat::Text => "txt",
            };

            let output_path = output_dir.join(format!("{}.{}", output_name, extension));
            let content = process::format_report(report, args.format)?;

            fs::write(&output_path, content)?;
            debug!("Wrote output to {}", output_path.display());
        }
    }

    // Generate summary if requested
    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    // Print summary
    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed, {} flagged for manual review",
        style(successful.len()).green(),
        style(failed.len()).red(),
        style(needs_review).yellow()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn write_summary(path: &PathBuf, results: &[BatchResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "method",
        "confidence",
        "sales_tax_total",
        "purchase_tax_total",
        "manual_review",
        "processing_time_ms",
        "error",
    ])?;

    for result in results {
        let filename = result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        if let Some(report) = &result.report {
            let sales_total: rust_decimal::Decimal = report.sales_tax.iter().sum();
            let purchase_total: rust_decimal::Decimal = report.purchase_tax.iter().sum();
            wtr.write_record([
                filename,
                if report.success { "success" } else { "no_amounts" },
                &report.method.to_string(),
                &format!("{:.2}", report.confidence),
                &sales_total.to_string(),
                &purchase_total.to_string(),
                &report.requires_manual_review.to_string(),
                &report.processing_time_ms.to_string(),
                "",
            ])?;
        } else {
            wtr.write_record([
                filename,
                "error",
                "",
                "",
                "",
                "",
                "",
                &result.processing_time_ms.to_string(),
                result.error.as_deref().unwrap_or(""),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
