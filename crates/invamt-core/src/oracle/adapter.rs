//! Bounded, failure-absorbing access to the labeling oracle.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, OracleError};
use crate::models::config::OracleConfig;
use crate::models::record::{AmountCandidate, LabelProposal, RawText};

use super::{build_prompt, parse_oracle_output, LabelingOracle, OllamaOracle};

/// Why label inference produced no proposals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    /// Inference was switched off.
    OracleDisabled,
    /// The oracle could not be reached within the retry budget.
    OracleUnavailable,
    /// The oracle answered but the payload was unusable.
    MalformedOracleOutput,
}

impl DegradeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DegradeReason::OracleDisabled => "oracle_disabled",
            DegradeReason::OracleUnavailable => ErrorKind::OracleUnavailable.as_str(),
            DegradeReason::MalformedOracleOutput => "malformed_oracle_output",
        }
    }
}

/// Result of one label inference round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelInference {
    pub proposals: Vec<LabelProposal>,
    pub currency: Option<String>,
    pub degraded: Option<DegradeReason>,
}

impl LabelInference {
    fn degraded(reason: DegradeReason) -> Self {
        Self {
            degraded: Some(reason),
            ..Default::default()
        }
    }
}

/// Wraps a [`LabelingOracle`] with a timeout, a retry budget and a
/// concurrency cap. [`infer`](Self::infer) never fails.
pub struct LabelInferenceAdapter {
    oracle: Option<Arc<dyn LabelingOracle>>,
    timeout: Duration,
    max_retries: u32,
    strict: bool,
    permits: Arc<Semaphore>,
}

impl LabelInferenceAdapter {
    pub fn new(oracle: Arc<dyn LabelingOracle>, config: &OracleConfig) -> Self {
        Self {
            oracle: Some(oracle),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            max_retries: config.max_retries,
            strict: config.strict_payload,
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
        }
    }

    /// An adapter that never calls out and always returns no proposals.
    pub fn disabled() -> Self {
        let config = OracleConfig::default();
        Self {
            oracle: None,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: 0,
            strict: config.strict_payload,
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Build the configured Ollama-backed adapter, or a disabled one.
    pub fn from_config(config: &OracleConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        match OllamaOracle::from_config(config) {
            Ok(oracle) => Self::new(Arc::new(oracle), config),
            Err(e) => {
                warn!("Oracle client unavailable, labeling disabled: {}", e);
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.oracle.is_some()
    }

    /// Ask the oracle to label `candidates`.
    ///
    /// Transport errors and timeouts are retried up to `max_retries` times.
    /// Every failure ends in an empty proposal set with a degrade reason.
    pub async fn infer(&self, raw: &RawText, candidates: &[AmountCandidate]) -> LabelInference {
        let Some(oracle) = &self.oracle else {
            return LabelInference::degraded(DegradeReason::OracleDisabled);
        };

        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return LabelInference::degraded(DegradeReason::OracleUnavailable),
        };

        let prompt = build_prompt(raw, candidates);
        let completion = match self.complete_with_retry(oracle.as_ref(), &prompt).await {
            Ok(completion) => completion,
            Err(OracleError::Malformed(e)) => {
                warn!("Oracle {} returned an unreadable envelope: {}", oracle.name(), e);
                return LabelInference::degraded(DegradeReason::MalformedOracleOutput);
            }
            Err(e) => {
                warn!("Oracle {} unavailable: {}", oracle.name(), e);
                return LabelInference::degraded(DegradeReason::OracleUnavailable);
            }
        };

        match parse_oracle_output(&completion, self.strict) {
            Some(payload) => {
                info!(
                    "Oracle {} proposed {} labels",
                    oracle.name(),
                    payload.proposals.len()
                );
                LabelInference {
                    proposals: payload.proposals,
                    currency: payload.currency,
                    degraded: None,
                }
            }
            None => {
                warn!("Oracle {} output could not be parsed", oracle.name());
                debug!("Unparsed oracle output: {}", completion);
                LabelInference::degraded(DegradeReason::MalformedOracleOutput)
            }
        }
    }

    async fn complete_with_retry(
        &self,
        oracle: &dyn LabelingOracle,
        prompt: &super::OraclePrompt,
    ) -> Result<String, OracleError> {
        let mut attempt = 0;

        loop {
            let result = match tokio::time::timeout(self.timeout, oracle.complete(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout(self.timeout)),
            };

            match result {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Oracle call failed ({}), retrying ({}/{})",
                        e, attempt, self.max_retries
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{AmountExtractor, FieldExtractor};
    use crate::models::record::Label;
    use crate::oracle::OraclePrompt;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted responses, one per call.
    struct ScriptedOracle {
        responses: Mutex<VecDeque<Result<String, OracleError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedOracle {
        fn new(responses: Vec<Result<String, OracleError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LabelingOracle for ScriptedOracle {
        async fn complete(&self, _prompt: &OraclePrompt) -> Result<String, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(OracleError::Transport("script exhausted".into())))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct SlowOracle;

    #[async_trait]
    impl LabelingOracle for SlowOracle {
        async fn complete(&self, _prompt: &OraclePrompt) -> Result<String, OracleError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    /// Tracks how many calls are in flight at once.
    #[derive(Default)]
    struct CountingOracle {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LabelingOracle for CountingOracle {
        async fn complete(&self, _prompt: &OraclePrompt) -> Result<String, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(PAYLOAD.to_string())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn fixture() -> (RawText, Vec<AmountCandidate>) {
        let raw = RawText::from_text("Subtotal $50.00\nTax $5.00\nAmount due $55.00");
        let candidates = AmountExtractor::new().extract_all(raw.as_str());
        (raw, candidates)
    }

    const PAYLOAD: &str = r#"{"currency": "USD", "amounts": [{"type": "tax", "value": 5.00, "source": "text: 'Tax: $5.00'"}]}"#;

    #[tokio::test]
    async fn test_retries_once_then_succeeds() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Err(OracleError::Transport("connection refused".into())),
            Ok(PAYLOAD.to_string()),
        ]));
        let adapter = LabelInferenceAdapter::new(oracle.clone(), &OracleConfig::default());
        let (raw, candidates) = fixture();

        let inference = adapter.infer(&raw, &candidates).await;
        assert_eq!(oracle.calls(), 2);
        assert_eq!(inference.degraded, None);
        assert_eq!(inference.currency.as_deref(), Some("USD"));
        assert_eq!(inference.proposals.len(), 1);
        assert_eq!(inference.proposals[0].label, Label::Tax);
    }

    #[tokio::test]
    async fn test_unavailable_after_retry_budget() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Err(OracleError::Transport("connection refused".into())),
            Err(OracleError::Status { status: 503, body: String::new() }),
            Ok(PAYLOAD.to_string()),
        ]));
        let adapter = LabelInferenceAdapter::new(oracle.clone(), &OracleConfig::default());
        let (raw, candidates) = fixture();

        let inference = adapter.infer(&raw, &candidates).await;
        assert_eq!(oracle.calls(), 2);
        assert!(inference.proposals.is_empty());
        assert_eq!(inference.degraded, Some(DegradeReason::OracleUnavailable));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Err(OracleError::Status {
            status: 404,
            body: "model not found".into(),
        })]));
        let adapter = LabelInferenceAdapter::new(oracle.clone(), &OracleConfig::default());
        let (raw, candidates) = fixture();

        let inference = adapter.infer(&raw, &candidates).await;
        assert_eq!(oracle.calls(), 1);
        assert_eq!(inference.degraded, Some(DegradeReason::OracleUnavailable));
    }

    #[tokio::test]
    async fn test_malformed_output_yields_no_proposals() {
        let oracle = Arc::new(ScriptedOracle::new(vec![Ok(
            "I think the total is fifty dollars.".to_string()
        )]));
        let adapter = LabelInferenceAdapter::new(oracle.clone(), &OracleConfig::default());
        let (raw, candidates) = fixture();

        let inference = adapter.infer(&raw, &candidates).await;
        assert_eq!(oracle.calls(), 1);
        assert!(inference.proposals.is_empty());
        assert_eq!(inference.degraded, Some(DegradeReason::MalformedOracleOutput));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_unavailable() {
        let config = OracleConfig {
            timeout_secs: 2,
            ..Default::default()
        };
        let adapter = LabelInferenceAdapter::new(Arc::new(SlowOracle), &config);
        let (raw, candidates) = fixture();

        let inference = adapter.infer(&raw, &candidates).await;
        assert_eq!(inference.degraded, Some(DegradeReason::OracleUnavailable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_are_capped() {
        let oracle = Arc::new(CountingOracle::default());
        let config = OracleConfig {
            max_concurrency: 2,
            ..Default::default()
        };
        let adapter = LabelInferenceAdapter::new(oracle.clone(), &config);
        let (raw, candidates) = fixture();

        let (a, b, c, d, e) = tokio::join!(
            adapter.infer(&raw, &candidates),
            adapter.infer(&raw, &candidates),
            adapter.infer(&raw, &candidates),
            adapter.infer(&raw, &candidates),
            adapter.infer(&raw, &candidates),
        );

        for inference in [a, b, c, d, e] {
            assert_eq!(inference.degraded, None);
        }
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 5);
        assert_eq!(oracle.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_adapter() {
        let adapter = LabelInferenceAdapter::disabled();
        let (raw, candidates) = fixture();

        assert!(!adapter.is_enabled());
        let inference = adapter.infer(&raw, &candidates).await;
        assert_eq!(inference.degraded, Some(DegradeReason::OracleDisabled));
        assert!(inference.proposals.is_empty());
    }

    #[test]
    fn test_from_config_respects_enabled_flag() {
        let config = OracleConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(!LabelInferenceAdapter::from_config(&config).is_enabled());
    }
}
