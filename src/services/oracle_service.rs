//! Classification oracle adapter.
//!
//! Sends task contents to a local chat model and reduces its answer to a
//! binary verdict.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::OracleConfig;
use crate::error::OracleError;
use crate::models::oracle::{ChatMessage, ChatRequest, ChatResponse};
use crate::models::Verdict;

/// Literal the model emits for unsafe content.
pub const UNSAFE_MARKER: &str = "unsafe";

/// Only the marker substring decides; everything else counts as safe.
pub fn verdict_from_output(output: &str) -> Verdict {
    if output.contains(UNSAFE_MARKER) {
        Verdict::UNSAFE
    } else {
        Verdict::SAFE
    }
}

/// External text classifier.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Raw model output for `contents`.
    async fn classify(&self, contents: &str) -> Result<String, OracleError>;
}

/// Classify `contents` and derive the verdict.
pub async fn evaluate<C: Classifier + ?Sized>(
    classifier: &C,
    contents: &str,
) -> Result<Verdict, OracleError> {
    let output = classifier.classify(contents).await?;
    Ok(verdict_from_output(&output))
}

/// Ollama `/api/chat` client.
pub struct OllamaClassifier {
    endpoint: String,
    model: String,
    timeout: Duration,
    http: Client,
}

impl OllamaClassifier {
    pub fn new(config: &OracleConfig) -> Self {
        Self {
            endpoint: format!("{}/api/chat", config.host.trim_end_matches('/')),
            model: config.model.clone(),
            timeout: config.timeout,
            http: Client::new(),
        }
    }

    /// Timeouts win over whatever the failing step would otherwise report.
    fn http_error(&self, err: reqwest::Error, otherwise: fn(String) -> OracleError) -> OracleError {
        if err.is_timeout() {
            OracleError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            otherwise(err.to_string())
        }
    }
}

#[async_trait]
impl Classifier for OllamaClassifier {
    async fn classify(&self, contents: &str) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(contents)],
            stream: false,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.http_error(e, OracleError::Request))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: body.chars().take(256).collect(),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.http_error(e, OracleError::Malformed))?;

        debug!(model = %self.model, output = %chat.message.content, "Oracle answered");
        Ok(chat.message.content)
    }
}
