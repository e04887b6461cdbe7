//! Label inference through an external labeling oracle (LLM).
//!
//! Everything the oracle returns is untrusted. [`LabelInferenceAdapter`] is
//! the only caller of [`LabelingOracle`] and converts every failure into an
//! empty proposal set, so nothing from this module can fail a request.

mod adapter;
mod ollama;
mod parse;
mod prompt;

pub use adapter::{DegradeReason, LabelInference, LabelInferenceAdapter};
pub use ollama::OllamaOracle;
pub use parse::{normalize_label, parse_oracle_output, ParsedPayload};
pub use prompt::{build_prompt, OraclePrompt};

use async_trait::async_trait;

use crate::error::OracleError;

/// An external service that answers a labeling prompt with free-form text.
#[async_trait]
pub trait LabelingOracle: Send + Sync {
    /// Send the prompt and return the raw completion.
    async fn complete(&self, prompt: &OraclePrompt) -> Result<String, OracleError>;

    /// Human-readable oracle name.
    fn name(&self) -> &str;
}
