//! Ollama-compatible HTTP oracle.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OracleError;
use crate::models::config::OracleConfig;

use super::{LabelingOracle, OraclePrompt};

const USER_AGENT: &str = concat!("invamt/", env!("CARGO_PKG_VERSION"));

/// Oracle backed by a local Ollama server (`POST /api/generate`).
pub struct OllamaOracle {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    format: &'static str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaOracle {
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| OracleError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout,
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.endpoint)
    }

    fn request_body<'a>(&'a self, prompt: &'a OraclePrompt) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            system: &prompt.system,
            prompt: &prompt.user,
            format: "json",
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        }
    }
}

fn parse_envelope(body: &str) -> Result<String, OracleError> {
    serde_json::from_str::<GenerateResponse>(body)
        .map(|r| r.response)
        .map_err(|e| OracleError::Malformed(format!("unexpected response envelope: {}", e)))
}

#[async_trait]
impl LabelingOracle for OllamaOracle {
    async fn complete(&self, prompt: &OraclePrompt) -> Result<String, OracleError> {
        let url = self.generate_url();
        debug!("POST {} (model {})", url, self.model);

        let response = self
            .client
            .post(&url)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        parse_envelope(&body)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

impl OllamaOracle {
    fn classify(&self, err: reqwest::Error) -> OracleError {
        match OracleError::from(err) {
            OracleError::Timeout(_) => OracleError::Timeout(self.timeout),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn oracle() -> OllamaOracle {
        let config = OracleConfig {
            endpoint: "http://localhost:11434/".to_string(),
            model: "phi3:3.8b".to_string(),
            ..Default::default()
        };
        OllamaOracle::from_config(&config).unwrap()
    }

    #[test]
    fn test_generate_url_trims_trailing_slash() {
        assert_eq!(oracle().generate_url(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn test_request_body_shape() {
        let oracle = oracle();
        let prompt = OraclePrompt {
            system: "label things".to_string(),
            user: "- Amount: $5.00, Nearby Text: Tax\n".to_string(),
        };

        let body = serde_json::to_value(oracle.request_body(&prompt)).unwrap();
        assert_eq!(body["model"], "phi3:3.8b");
        assert_eq!(body["system"], "label things");
        assert_eq!(body["format"], "json");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"].as_f64(), Some(0.0));
    }

    #[test]
    fn test_parse_envelope() {
        let body = r#"{"model":"phi3","response":"{\"amounts\":[]}","done":true}"#;
        assert_eq!(parse_envelope(body).unwrap(), r#"{"amounts":[]}"#);

        let err = parse_envelope("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, OracleError::Malformed(_)));
    }
}
