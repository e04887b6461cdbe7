//! Configuration structures for the extraction pipeline.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{InvamtError, Result};

/// Main configuration for the invamt pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvamtConfig {
    /// Amount candidate extraction.
    pub extraction: ExtractionConfig,

    /// Labeling oracle (LLM) access.
    pub oracle: OracleConfig,

    /// Reconciliation of candidates and proposals.
    pub reconcile: ReconcileConfig,

    /// Text recognition.
    pub ocr: OcrConfig,
}

/// Amount candidate extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Characters scanned before an amount for context and indicator words.
    pub context_window: usize,

    /// Words marking a nearby bare number as monetary.
    pub indicator_words: Vec<String>,

    /// Accept bare numbers with exactly two fractional digits without an indicator word.
    pub accept_bare_decimals: bool,

    /// Correct common OCR letter/digit confusions inside numeric tokens.
    pub ocr_corrections: bool,

    /// Skip numbers shaped like calendar dates.
    pub exclude_dates: bool,

    /// Skip phone-like digit sequences.
    pub exclude_phone_numbers: bool,

    /// Skip clock times such as `12:30`.
    pub exclude_times: bool,

    /// Skip percentages such as `23%`.
    pub exclude_percentages: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            context_window: 30,
            indicator_words: default_indicator_words(),
            accept_bare_decimals: true,
            ocr_corrections: true,
            exclude_dates: true,
            exclude_phone_numbers: true,
            exclude_times: true,
            exclude_percentages: true,
        }
    }
}

fn default_indicator_words() -> Vec<String> {
    [
        "total", "subtotal", "sub", "amount", "due", "balance", "tax", "vat", "gst", "hst",
        "discount", "shipping", "freight", "delivery", "paid", "payment", "price", "cost",
        "fee", "charge", "tip", "net", "gross", "sum", "razem", "suma", "brutto", "netto",
        "kwota",
    ]
    .iter()
    .map(|w| w.to_string())
    .collect()
}

/// Labeling oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Query the oracle at all. When off, labels come from the fallback heuristic.
    pub enabled: bool,

    /// Base URL of the Ollama server.
    pub endpoint: String,

    /// Model name.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Timeout for a single oracle call, in seconds.
    pub timeout_secs: u64,

    /// Additional attempts after a transport failure.
    pub max_retries: u32,

    /// Maximum concurrent oracle calls per pipeline.
    pub max_concurrency: usize,

    /// Reject the whole payload when any entry is malformed.
    pub strict_payload: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://localhost:11434".to_string(),
            model: "phi3:3.8b".to_string(),
            temperature: 0.0,
            timeout_secs: 30,
            max_retries: 1,
            max_concurrency: 4,
            strict_payload: true,
        }
    }
}

/// Reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Maximum difference between a proposal and a candidate to count as a match.
    pub epsilon: Decimal,

    /// Label the largest positive candidate `amount_due` when nothing matched.
    pub fallback_to_largest: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            epsilon: Decimal::new(1, 2),
            fallback_to_largest: true,
        }
    }
}

/// Text recognition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,

    /// Text recognition model file name.
    pub recognition_model: String,

    /// Character dictionary file name.
    pub dictionary: String,

    /// Keep `[UNK]` tokens in recognized text.
    pub keep_unk: bool,

    /// Vertical distance (pixels) under which boxes share a row.
    pub row_tolerance: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
            recognition_model: "latin_rec.onnx".to_string(),
            dictionary: "latin_dict.txt".to_string(),
            keep_unk: false,
            row_tolerance: 20.0,
        }
    }
}

impl OcrConfig {
    /// Get full path to a model file.
    pub fn model_path(&self, model_name: &str) -> PathBuf {
        self.model_dir.join(model_name)
    }

    /// Whether the detection and recognition models are present on disk.
    pub fn models_present(&self) -> bool {
        self.model_path(&self.detection_model).exists()
            && self.model_path(&self.recognition_model).exists()
    }
}

impl InvamtConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.reconcile.epsilon.is_sign_negative() {
            return Err(InvamtError::Config(format!(
                "reconcile.epsilon must not be negative, got {}",
                self.reconcile.epsilon
            )));
        }
        if self.oracle.max_concurrency == 0 {
            return Err(InvamtError::Config(
                "oracle.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.oracle.enabled && self.oracle.endpoint.trim().is_empty() {
            return Err(InvamtError::Config(
                "oracle.endpoint is empty while the oracle is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

impl FromStr for InvamtConfig {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}
