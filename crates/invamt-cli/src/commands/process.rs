//! Process command - extract labeled amounts from a single invoice.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use invamt_core::PipelineInput;

use super::{build_pipeline, fail, format_report, load_config, read_input, OutputFormat};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (image or text)
    #[arg(required_unless_present = "text", conflicts_with = "text")]
    input: Option<PathBuf>,

    /// Process this text instead of a file
    #[arg(long)]
    text: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Emit the full report (status, currency, sources) instead of the bare record
    #[arg(long)]
    report: bool,

    /// Skip the labeling oracle and use the heuristic fallback only
    #[arg(long)]
    no_oracle: bool,

    /// Oracle endpoint (overrides configuration)
    #[arg(long)]
    oracle_url: Option<String>,

    /// Oracle model name (overrides configuration)
    #[arg(long)]
    oracle_model: Option<String>,

    /// OCR model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if args.no_oracle {
        config.oracle.enabled = false;
    }
    if let Some(url) = &args.oracle_url {
        config.oracle.endpoint = url.clone();
    }
    if let Some(model) = &args.oracle_model {
        config.oracle.model = model.clone();
    }
    if let Some(dir) = &args.model_dir {
        config.ocr.model_dir = dir.clone();
    }

    let input = match (&args.text, &args.input) {
        (Some(text), _) => PipelineInput::Text(text.clone()),
        (None, Some(path)) => {
            if !path.exists() {
                anyhow::bail!("Input file not found: {}", path.display());
            }
            info!("Processing file: {}", path.display());
            match read_input(path)? {
                Ok(input) => input,
                Err(e) => fail(&e),
            }
        }
        (None, None) => anyhow::bail!("Either an input file or --text is required"),
    };

    let with_ocr = matches!(input, PipelineInput::Image(_));
    let pipeline = match build_pipeline(&config, with_ocr) {
        Ok(pipeline) => pipeline,
        Err(e) => fail(&e),
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(if with_ocr {
        "Recognizing and labeling amounts..."
    } else {
        "Labeling amounts..."
    });

    let result = pipeline.process(input).await;
    pb.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(e) => fail(&e),
    };

    let output = format_report(&report, args.format, args.report)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}
