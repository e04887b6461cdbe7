//! Core library for invoice amount extraction.
//!
//! This crate provides:
//! - Amount candidate extraction from noisy OCR or free-form text
//! - A text recognition boundary (pure Rust PaddleOCR models behind `native`)
//! - Label inference through an LLM oracle (Ollama)
//! - Reconciliation of oracle proposals against extracted candidates
//! - The pipeline tying these together into an [`ExtractionReport`]

pub mod error;
pub mod extract;
pub mod models;
pub mod ocr;
pub mod oracle;
pub mod pipeline;
pub mod reconcile;

pub use error::{ErrorKind, InvamtError, OracleError, PipelineError, RecognitionError, Result};
pub use extract::{AmountExtractor, FieldExtractor};
pub use models::config::InvamtConfig;
pub use models::record::{
    AmountCandidate, AmountSource, ExtractionReport, Label, LabelProposal, LabeledRecord,
    RawText, ReportStatus, SourceKind,
};
pub use ocr::{OcrResult, TextBox, TextRecognizer};
#[cfg(feature = "native")]
pub use ocr::PureOcrRecognizer;
pub use oracle::{LabelInferenceAdapter, LabelingOracle, OllamaOracle};
pub use pipeline::{Pipeline, PipelineInput};
pub use reconcile::{Reconciled, ReconciliationEngine};
