//! Data model flowing through the extraction pipeline.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Number of fractional digits every amount is normalized to.
pub const AMOUNT_SCALE: u32 = 2;

/// Normalize a decimal to the canonical two-digit fixed-point form.
pub fn canonical_amount(value: Decimal) -> Decimal {
    let mut value = value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    value.rescale(AMOUNT_SCALE);
    value
}

/// Where the raw text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Recognized from an image.
    Image,
    /// Submitted directly as text.
    Text,
}

/// Full text content of one request, prior to amount extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawText {
    content: String,
    source: SourceKind,
}

impl RawText {
    pub fn new(content: impl Into<String>, source: SourceKind) -> Self {
        Self {
            content: content.into(),
            source,
        }
    }

    pub fn from_text(content: impl Into<String>) -> Self {
        Self::new(content, SourceKind::Text)
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// A monetary value detected in the raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountCandidate {
    /// Normalized value with two fractional digits.
    pub value: Decimal,
    /// Substring of the raw text that was matched.
    pub raw: String,
    /// Byte span `(start, end)` in the raw text.
    pub span: (usize, usize),
    /// Words preceding the amount, used as a labeling hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Currency marker found next to the amount, as written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// An amount-indicator word appears within the context window.
    pub indicator_adjacent: bool,
}

impl AmountCandidate {
    pub fn start(&self) -> usize {
        self.span.0
    }

    /// Context as shown to the oracle and in provenance strings.
    pub fn context_or_unknown(&self) -> &str {
        self.context.as_deref().unwrap_or("Unknown")
    }
}

/// Canonical label vocabulary. Unknown names map to [`Label::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    SubTotal,
    Discount,
    Shipping,
    Tax,
    Total,
    AmountPaid,
    AmountDue,
    Other,
}

impl Label {
    pub const ALL: [Label; 8] = [
        Label::SubTotal,
        Label::Discount,
        Label::Shipping,
        Label::Tax,
        Label::Total,
        Label::AmountPaid,
        Label::AmountDue,
        Label::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::SubTotal => "sub_total",
            Label::Discount => "discount",
            Label::Shipping => "shipping",
            Label::Tax => "tax",
            Label::Total => "total",
            Label::AmountPaid => "amount_paid",
            Label::AmountDue => "amount_due",
            Label::Other => "other",
        }
    }

    /// Look up an already-canonical name.
    pub fn from_canonical(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.as_str() == name)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unverified label/value assertion from the labeling oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelProposal {
    pub label: Label,
    /// Label exactly as the oracle wrote it.
    pub raw_label: String,
    pub value: Decimal,
    /// Free-form provenance the oracle attached, if any.
    pub source: Option<String>,
}

impl LabelProposal {
    pub fn new(label: Label, value: Decimal) -> Self {
        Self {
            label,
            raw_label: label.as_str().to_string(),
            value,
            source: None,
        }
    }
}

/// Final mapping of label to verified monetary value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabeledRecord(BTreeMap<Label, Decimal>);

impl LabeledRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: Label, value: Decimal) -> Option<Decimal> {
        self.0.insert(label, canonical_amount(value))
    }

    pub fn get(&self, label: Label) -> Option<Decimal> {
        self.0.get(&label).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Label, Decimal)> + '_ {
        self.0.iter().map(|(l, v)| (*l, *v))
    }

    pub fn values(&self) -> impl Iterator<Item = Decimal> + '_ {
        self.0.values().copied()
    }
}

/// Overall outcome of one extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Labels were confirmed against the source text.
    Ok,
    /// Valid input but nothing monetary in it.
    NoAmountsFound,
    /// Labels come from the heuristic fallback only.
    Degraded,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Ok => "ok",
            ReportStatus::NoAmountsFound => ErrorKind::NoAmountsFound.as_str(),
            ReportStatus::Degraded => "degraded",
        }
    }
}

/// Provenance of one labeled value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountSource {
    #[serde(rename = "type")]
    pub label: Label,
    pub value: Decimal,
    /// `text: 'Context: amount'` reconstruction of where the value was read.
    pub source: String,
}

/// Response envelope around a [`LabeledRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub amounts: LabeledRecord,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<AmountSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ExtractionReport {
    /// The absorbed error kind behind a non-`ok` report, if any.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self.status {
            ReportStatus::NoAmountsFound => Some(ErrorKind::NoAmountsFound),
            ReportStatus::Degraded
                if self.reason.as_deref() == Some(ErrorKind::OracleUnavailable.as_str()) =>
            {
                Some(ErrorKind::OracleUnavailable)
            }
            _ => None,
        }
    }

    pub fn no_amounts_found() -> Self {
        Self {
            status: ReportStatus::NoAmountsFound,
            currency: None,
            amounts: LabeledRecord::new(),
            sources: Vec::new(),
            reason: Some("no monetary amounts found in the input".to_string()),
        }
    }
}
