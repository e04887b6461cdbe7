//! CLI subcommands and the helpers they share.

pub mod batch;
pub mod config;
pub mod process;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use invamt_core::error::{PipelineError, RecognitionError};
use invamt_core::models::config::InvamtConfig;
use invamt_core::models::record::{ExtractionReport, Label};
use invamt_core::extract::format_amount;
use invamt_core::{Pipeline, PipelineInput, PureOcrRecognizer};

/// Exit code for client errors (empty or non-textual input).
pub const EXIT_MALFORMED_INPUT: i32 = 2;
/// Exit code for failed text recognition.
pub const EXIT_RECOGNITION_FAILURE: i32 = 3;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "tif", "bmp", "webp"];

/// Load the configuration from `config_path`, the default location, or defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<InvamtConfig> {
    if let Some(path) = config_path {
        return Ok(InvamtConfig::from_file(Path::new(path))?);
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        debug!("Using configuration from {}", default_path.display());
        Ok(InvamtConfig::from_file(&default_path)?)
    } else {
        Ok(InvamtConfig::default())
    }
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read a file as pipeline input: images by extension, everything else as text.
pub fn read_input(path: &Path) -> anyhow::Result<Result<PipelineInput, PipelineError>> {
    let data = std::fs::read(path)?;

    if is_image_path(path) {
        return Ok(Ok(PipelineInput::Image(data)));
    }

    Ok(String::from_utf8(data)
        .map(PipelineInput::Text)
        .map_err(|_| PipelineError::MalformedInput(format!("{} is not valid UTF-8 text", path.display()))))
}

/// Build the pipeline, loading OCR models only when image input is expected.
pub fn build_pipeline(config: &InvamtConfig, with_ocr: bool) -> Result<Pipeline, PipelineError> {
    let pipeline = Pipeline::from_config(config);
    if !with_ocr {
        return Ok(pipeline);
    }

    if !config.ocr.models_present() {
        return Err(RecognitionError::ModelLoad(format!(
            "OCR models not found in {}",
            config.ocr.model_dir.display()
        ))
        .into());
    }

    let recognizer = PureOcrRecognizer::from_config(&config.ocr)?;
    Ok(pipeline.with_recognizer(Arc::new(recognizer)))
}

pub fn exit_code(err: &PipelineError) -> i32 {
    if err.is_client_error() {
        EXIT_MALFORMED_INPUT
    } else {
        EXIT_RECOGNITION_FAILURE
    }
}

/// `{"status":"error","kind":...,"reason":...}`
pub fn error_payload(err: &PipelineError) -> serde_json::Value {
    serde_json::json!({
        "status": "error",
        "kind": err.kind(),
        "reason": err.to_string(),
    })
}

/// Print the error payload and exit with the matching code.
pub fn fail(err: &PipelineError) -> ! {
    println!("{}", error_payload(err));
    std::process::exit(exit_code(err));
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub fn format_report(
    report: &ExtractionReport,
    format: OutputFormat,
    full: bool,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json if full => Ok(serde_json::to_string(report)?),
        OutputFormat::Json => Ok(serde_json::to_string(&report.amounts)?),
        OutputFormat::Csv => format_csv(report),
        OutputFormat::Text => Ok(format_text(report)),
    }
}

fn format_csv(report: &ExtractionReport) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(["label", "value", "currency", "source"])?;

    for (label, value) in report.amounts.iter() {
        let source = report
            .sources
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.source.as_str())
            .unwrap_or("");
        wtr.write_record([
            label.as_str(),
            &value.to_string(),
            report.currency.as_deref().unwrap_or(""),
            source,
        ])?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(report: &ExtractionReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("Status: {}\n", report.status.as_str()));
    if let Some(reason) = &report.reason {
        output.push_str(&format!("Reason: {}\n", reason));
    }
    output.push('\n');

    if report.amounts.is_empty() {
        output.push_str("No amounts found.\n");
        return output;
    }

    let currency = report.currency.as_deref().unwrap_or("");
    for label in Label::ALL {
        if let Some(value) = report.amounts.get(label) {
            output.push_str(&format!(
                "  {:<12} {:>14} {}\n",
                label.as_str(),
                format_amount(value),
                currency
            ));
        }
    }

    output
}

/// Output path for `input` inside `dir` with the format's extension.
pub fn output_path_for(dir: &Path, input: &Path, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("invoice");
    dir.join(format!("{}.{}", stem, format.extension()))
}
