//! End-to-end orchestration: recognize, extract, label, reconcile.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::{PipelineError, RecognitionError};
use crate::extract::{dominant_currency, AmountExtractor, FieldExtractor};
use crate::models::config::InvamtConfig;
use crate::models::record::{ExtractionReport, RawText, ReportStatus, SourceKind};
use crate::ocr::TextRecognizer;
use crate::oracle::LabelInferenceAdapter;
use crate::reconcile::ReconciliationEngine;

/// Default vertical tolerance for grouping recognized boxes into lines.
const DEFAULT_ROW_TOLERANCE: f32 = 20.0;

/// One request payload.
#[derive(Debug, Clone)]
pub enum PipelineInput {
    /// Encoded image bytes (PNG, JPEG, ...).
    Image(Vec<u8>),
    /// Already-extracted text.
    Text(String),
}

/// The extraction pipeline. Cheap to share behind an [`Arc`]; holds no
/// per-request state.
pub struct Pipeline {
    extractor: AmountExtractor,
    adapter: LabelInferenceAdapter,
    engine: ReconciliationEngine,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    row_tolerance: f32,
}

impl Pipeline {
    pub fn new(
        extractor: AmountExtractor,
        adapter: LabelInferenceAdapter,
        engine: ReconciliationEngine,
    ) -> Self {
        Self {
            extractor,
            adapter,
            engine,
            recognizer: None,
            row_tolerance: DEFAULT_ROW_TOLERANCE,
        }
    }

    /// Build a pipeline from configuration. Image input additionally needs
    /// [`with_recognizer`](Self::with_recognizer).
    pub fn from_config(config: &InvamtConfig) -> Self {
        Self::new(
            AmountExtractor::with_config(config.extraction.clone()),
            LabelInferenceAdapter::from_config(&config.oracle),
            ReconciliationEngine::new(config.reconcile.clone()),
        )
        .with_row_tolerance(config.ocr.row_tolerance)
    }

    /// Set the text recognizer used for image input.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Set the row grouping tolerance for recognized boxes.
    pub fn with_row_tolerance(mut self, tolerance: f32) -> Self {
        self.row_tolerance = tolerance;
        self
    }

    /// Run one request through the pipeline.
    ///
    /// Oracle problems never surface here: they degrade the report instead.
    /// Only unusable input and failed recognition are errors.
    pub async fn process(&self, input: PipelineInput) -> Result<ExtractionReport, PipelineError> {
        match input {
            PipelineInput::Image(bytes) => self.process_image(bytes).await,
            PipelineInput::Text(text) => self.process_text(&text).await,
        }
    }

    pub async fn process_text(&self, text: &str) -> Result<ExtractionReport, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::MalformedInput("text is empty".to_string()));
        }
        if text.contains('\0') {
            return Err(PipelineError::MalformedInput(
                "text contains binary data".to_string(),
            ));
        }

        Ok(self.run(RawText::from_text(text)).await)
    }

    pub async fn process_image(&self, bytes: Vec<u8>) -> Result<ExtractionReport, PipelineError> {
        if bytes.is_empty() {
            return Err(PipelineError::MalformedInput("image is empty".to_string()));
        }
        let recognizer = self
            .recognizer
            .clone()
            .ok_or(RecognitionError::NotConfigured)?;

        let start = Instant::now();
        let ocr = tokio::task::spawn_blocking(move || recognizer.recognize(&bytes))
            .await
            .map_err(|e| RecognitionError::Recognition(format!("recognition task failed: {}", e)))??;

        if !ocr.has_text() {
            return Err(RecognitionError::NoText.into());
        }

        let text = ocr.to_raw_text(self.row_tolerance);
        info!(
            "Recognized {} text boxes ({} lines) in {}ms",
            ocr.boxes.len(),
            text.lines().count(),
            start.elapsed().as_millis()
        );

        Ok(self.run(RawText::new(text, SourceKind::Image)).await)
    }

    async fn run(&self, raw: RawText) -> ExtractionReport {
        let candidates = self.extractor.extract_all(raw.as_str());
        info!("Extracted {} amount candidates", candidates.len());

        if candidates.is_empty() {
            return ExtractionReport::no_amounts_found();
        }

        let inference = self.adapter.infer(&raw, &candidates).await;
        let reconciled = self.engine.reconcile(&candidates, &inference.proposals);
        info!(
            "Reconciled {} proposals into {} labels",
            inference.proposals.len(),
            reconciled.record.len()
        );

        let currency = inference
            .currency
            .clone()
            .or_else(|| dominant_currency(&candidates));

        let (status, reason) = if reconciled.used_fallback || reconciled.record.is_empty() {
            let reason = match inference.degraded {
                Some(reason) => reason.as_str().to_string(),
                None => "no label proposal matched an extracted amount".to_string(),
            };
            warn!("Degraded result: {}", reason);
            (ReportStatus::Degraded, Some(reason))
        } else {
            (ReportStatus::Ok, None)
        };
        debug!("Report status {:?}, currency {:?}", status, currency);

        ExtractionReport {
            status,
            currency,
            amounts: reconciled.record,
            sources: reconciled.sources,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::models::config::OracleConfig;
    use crate::models::record::Label;
    use crate::ocr::{OcrResult, TextBox};
    use crate::oracle::{LabelingOracle, OraclePrompt};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    /// Always answers with the same completion.
    struct FixedOracle(String);

    #[async_trait]
    impl LabelingOracle for FixedOracle {
        async fn complete(&self, _prompt: &OraclePrompt) -> Result<String, OracleError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct UnreachableOracle;

    #[async_trait]
    impl LabelingOracle for UnreachableOracle {
        async fn complete(&self, _prompt: &OraclePrompt) -> Result<String, OracleError> {
            Err(OracleError::Transport("connection refused".into()))
        }

        fn name(&self) -> &str {
            "unreachable"
        }
    }

    struct StubRecognizer(Vec<TextBox>);

    impl TextRecognizer for StubRecognizer {
        fn recognize(&self, _image: &[u8]) -> Result<OcrResult, RecognitionError> {
            Ok(OcrResult::from_boxes(self.0.clone()))
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    struct BrokenRecognizer;

    impl TextRecognizer for BrokenRecognizer {
        fn recognize(&self, _image: &[u8]) -> Result<OcrResult, RecognitionError> {
            Err(RecognitionError::InvalidImage("not an image".into()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    const SENTENCE: &str =
        "The subtotal is $50.00 and the tax is $5.00, making the total amount $55.00";

    const LABELS: &str = r#"{"currency": "USD", "amounts": [
        {"type": "sub_total", "value": 50.00, "source": "text: 'subtotal is: $50.00'"},
        {"type": "tax", "value": 5.00, "source": "text: 'tax is: $5.00'"},
        {"type": "amount_due", "value": 55.00, "source": "text: 'total amount: $55.00'"}
    ], "status": "ok"}"#;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn pipeline_with(oracle: impl LabelingOracle + 'static) -> Pipeline {
        let adapter = LabelInferenceAdapter::new(Arc::new(oracle), &OracleConfig::default());
        Pipeline::new(
            AmountExtractor::new(),
            adapter,
            ReconciliationEngine::default(),
        )
    }

    #[tokio::test]
    async fn test_sentence_with_working_oracle() {
        let pipeline = pipeline_with(FixedOracle(LABELS.to_string()));

        let report = pipeline.process_text(SENTENCE).await.unwrap();
        assert_eq!(report.status, ReportStatus::Ok);
        assert_eq!(report.currency.as_deref(), Some("USD"));
        assert_eq!(
            serde_json::to_string(&report.amounts).unwrap(),
            r#"{"sub_total":50.00,"tax":5.00,"amount_due":55.00}"#
        );
        assert_eq!(report.reason, None);
    }

    #[tokio::test]
    async fn test_text_without_amounts() {
        let pipeline = pipeline_with(FixedOracle(LABELS.to_string()));

        let report = pipeline
            .process(PipelineInput::Text("Thank you for your visit".into()))
            .await
            .unwrap();
        assert_eq!(report.status, ReportStatus::NoAmountsFound);
        assert!(report.amounts.is_empty());
        assert_eq!(serde_json::to_string(&report.amounts).unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_unparseable_oracle_output_falls_back() {
        let pipeline = pipeline_with(FixedOracle("The total is probably $55".to_string()));

        let report = pipeline.process_text(SENTENCE).await.unwrap();
        assert_eq!(report.status, ReportStatus::Degraded);
        assert_eq!(report.amounts.len(), 1);
        assert_eq!(report.amounts.get(Label::AmountDue), Some(dec("55.00")));
        assert_eq!(report.reason.as_deref(), Some("malformed_oracle_output"));
        assert_eq!(report.currency.as_deref(), Some("USD"));
    }

    #[tokio::test]
    async fn test_unreachable_oracle_is_not_an_error() {
        let pipeline = pipeline_with(UnreachableOracle);

        let report = pipeline.process_text(SENTENCE).await.unwrap();
        assert_eq!(report.status, ReportStatus::Degraded);
        assert_eq!(report.amounts.get(Label::AmountDue), Some(dec("55.00")));
        assert_eq!(report.reason.as_deref(), Some("oracle_unavailable"));
        assert_eq!(report.kind(), Some(crate::error::ErrorKind::OracleUnavailable));

        let report = pipeline.process_text("Thank you for your visit").await.unwrap();
        assert_eq!(report.status, ReportStatus::NoAmountsFound);
        assert_eq!(report.kind(), Some(crate::error::ErrorKind::NoAmountsFound));
    }

    #[tokio::test]
    async fn test_hallucinated_values_never_reach_output() {
        let labels = r#"{"amounts": [
            {"type": "discount", "value": 7.77, "source": ""},
            {"type": "tax", "value": 5.00, "source": ""}
        ]}"#;
        let pipeline = pipeline_with(FixedOracle(labels.to_string()));

        let text = "Subtotal $50.00\nTax $5.00\nDue $55.00";
        let candidates = AmountExtractor::new().extract_all(text);
        let report = pipeline.process_text(text).await.unwrap();

        assert_eq!(report.amounts.get(Label::Discount), None);
        for value in report.amounts.values() {
            assert!(candidates.iter().any(|c| c.value == value));
        }
    }

    #[tokio::test]
    async fn test_idempotent_with_deterministic_oracle() {
        let pipeline = pipeline_with(FixedOracle(LABELS.to_string()));

        let first = pipeline.process_text(SENTENCE).await.unwrap();
        let second = pipeline.process_text(SENTENCE).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_input_is_malformed() {
        let pipeline = pipeline_with(FixedOracle(LABELS.to_string()));

        let err = pipeline.process_text("   \n").await.unwrap_err();
        assert!(err.is_client_error());

        let err = pipeline.process(PipelineInput::Image(Vec::new())).await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput(_)));
    }

    #[tokio::test]
    async fn test_image_input_through_recognizer() {
        let recognizer = StubRecognizer(vec![
            TextBox::from_rect(10.0, 100.0, 120.0, 20.0, "SUB TOTAL"),
            TextBox::from_rect(300.0, 102.0, 80.0, 20.0, "$50.00"),
            TextBox::from_rect(10.0, 130.0, 120.0, 20.0, "TAX"),
            TextBox::from_rect(300.0, 131.0, 80.0, 20.0, "$5.00"),
            TextBox::from_rect(10.0, 160.0, 120.0, 20.0, "Amount DUE"),
            TextBox::from_rect(300.0, 158.0, 80.0, 20.0, "$55.00"),
        ]);
        let pipeline =
            pipeline_with(FixedOracle(LABELS.to_string())).with_recognizer(Arc::new(recognizer));

        let report = pipeline
            .process(PipelineInput::Image(vec![0x89, b'P', b'N', b'G']))
            .await
            .unwrap();
        assert_eq!(report.status, ReportStatus::Ok);
        assert_eq!(report.amounts.get(Label::SubTotal), Some(dec("50.00")));
        assert_eq!(report.amounts.get(Label::AmountDue), Some(dec("55.00")));
        assert_eq!(report.sources[0].source, "text: 'SUB TOTAL: $50.00'");
    }

    #[tokio::test]
    async fn test_recognition_failures() {
        let pipeline = pipeline_with(FixedOracle(LABELS.to_string()));
        let err = pipeline.process_image(vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RecognitionFailure(RecognitionError::NotConfigured)
        ));

        let pipeline = pipeline.with_recognizer(Arc::new(BrokenRecognizer));
        let err = pipeline.process_image(vec![1, 2, 3]).await.unwrap_err();
        assert!(!err.is_client_error());
        assert_eq!(err.kind(), crate::error::ErrorKind::RecognitionFailure);

        let pipeline = pipeline.with_recognizer(Arc::new(StubRecognizer(Vec::new())));
        let err = pipeline.process_image(vec![1, 2, 3]).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::RecognitionFailure(RecognitionError::NoText)
        ));
    }

    #[tokio::test]
    async fn test_disabled_oracle_uses_fallback() {
        let pipeline = Pipeline::from_config(&InvamtConfig {
            oracle: OracleConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        });

        let report = pipeline.process_text("Total: 1.234,56 zł").await.unwrap();
        assert_eq!(report.status, ReportStatus::Degraded);
        assert_eq!(report.currency.as_deref(), Some("PLN"));
        assert_eq!(report.amounts.get(Label::AmountDue), Some(dec("1234.56")));
        assert_eq!(report.reason.as_deref(), Some("oracle_disabled"));
    }
}
