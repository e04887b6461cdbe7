//! Batch processing command for multiple invoice files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use futures_util::stream::{self, StreamExt};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use invamt_core::models::record::{ExtractionReport, Label};
use invamt_core::{ErrorKind, Pipeline, PipelineError};

use super::{
    build_pipeline, format_report, is_image_path, load_config, output_path_for, read_input,
    OutputFormat,
};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input glob pattern (images and .txt files)
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Write full reports instead of bare records
    #[arg(long)]
    report: bool,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of files processed concurrently
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Exit successfully even if some files failed
    #[arg(long)]
    continue_on_error: bool,

    /// Skip the labeling oracle
    #[arg(long)]
    no_oracle: bool,

    /// OCR model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

/// Result of processing a single file.
struct FileResult {
    path: PathBuf,
    outcome: Result<ExtractionReport, FileFailure>,
    processing_time_ms: u64,
}

/// Why a file produced no report.
struct FileFailure {
    kind: Option<ErrorKind>,
    message: String,
}

impl From<PipelineError> for FileFailure {
    fn from(err: PipelineError) -> Self {
        Self {
            kind: Some(err.kind()),
            message: err.to_string(),
        }
    }
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if args.no_oracle {
        config.oracle.enabled = false;
    }
    if let Some(dir) = &args.model_dir {
        config.ocr.model_dir = dir.clone();
    }

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| is_image_path(p) || p.extension().is_some_and(|e| e.eq_ignore_ascii_case("txt")))
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

    let has_images = files.iter().any(|p| is_image_path(p));
    let pipeline = match build_pipeline(&config, has_images) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            warn!("OCR unavailable, image files will fail: {}", e);
            Pipeline::from_config(&config)
        }
    };
    let pipeline = Arc::new(pipeline);

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
            .unwrap()
            .progress_chars("=>-"),
    );

    let mut results: Vec<FileResult> = stream::iter(files)
        .map(|path| {
            let pipeline = Arc::clone(&pipeline);
            let pb = overall_pb.clone();
            async move {
                let file_start = Instant::now();
                let outcome = process_file(&pipeline, &path).await;
                if let Err(e) = &outcome {
                    warn!("Failed to process {}: {}", path.display(), e.message);
                }
                pb.inc(1);
                FileResult {
                    path,
                    outcome,
                    processing_time_ms: file_start.elapsed().as_millis() as u64,
                }
            }
        })
        .buffer_unordered(args.jobs.max(1))
        .collect()
        .await;

    overall_pb.finish_with_message("Complete");
    results.sort_by(|a, b| a.path.cmp(&b.path));

    if let Some(output_dir) = &args.output_dir {
        for result in &results {
            if let Ok(report) = &result.outcome {
                let output_path = output_path_for(output_dir, &result.path, args.format);
                fs::write(&output_path, format_report(report, args.format, args.report)?)?;
                debug!("Wrote output to {}", output_path.display());
            }
        }
    }

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

    let failed: Vec<&FileResult> = results.iter().filter(|r| r.outcome.is_err()).collect();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(results.len() - failed.len()).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            if let Err(e) = &result.outcome {
                println!("  - {}: {}", result.path.display(), e.message);
            }
        }

        if !args.continue_on_error {
            anyhow::bail!("{} of {} files failed", failed.len(), results.len());
        }
    }

    Ok(())
}

async fn process_file(pipeline: &Pipeline, path: &Path) -> Result<ExtractionReport, FileFailure> {
    let input = match read_input(path) {
        Ok(input) => input?,
        Err(e) => {
            return Err(FileFailure {
                kind: None,
                message: e.to_string(),
            })
        }
    };

    Ok(pipeline.process(input).await?)
}

fn write_summary(path: &Path, results: &[FileResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec!["filename", "status", "currency"];
    header.extend(Label::ALL.iter().map(|l| l.as_str()));
    header.extend(["processing_time_ms", "kind", "error"]);
    wtr.write_record(&header)?;

    for result in results {
        let filename = result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_string();

        let mut row = vec![filename];
        match &result.outcome {
            Ok(report) => {
                row.push(report.status.as_str().to_string());
                row.push(report.currency.clone().unwrap_or_default());
                row.extend(
                    Label::ALL
                        .iter()
                        .map(|l| report.amounts.get(*l).map(|v| v.to_string()).unwrap_or_default()),
                );
                row.push(result.processing_time_ms.to_string());
                row.push(kind_column(report.kind()));
                row.push(String::new());
            }
            Err(e) => {
                row.push("error".to_string());
                row.push(String::new());
                row.extend(Label::ALL.iter().map(|_| String::new()));
                row.push(result.processing_time_ms.to_string());
                row.push(kind_column(e.kind));
                row.push(e.message.clone());
            }
        }
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

fn kind_column(kind: Option<ErrorKind>) -> String {
    kind.map(|k| k.as_str().to_string()).unwrap_or_default()
}
