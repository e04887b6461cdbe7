//! Data models and configuration.

pub mod config;
pub mod record;

pub use config::{ExtractionConfig, InvamtConfig, OcrConfig, OracleConfig, ReconcileConfig};
pub use record::{
    canonical_amount, AmountCandidate, AmountSource, ExtractionReport, Label, LabelProposal,
    LabeledRecord, RawText, ReportStatus, SourceKind,
};
