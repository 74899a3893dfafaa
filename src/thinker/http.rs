//! HTTP-backed thinker transport.
//!
//! The concrete reasoning service's wire protocol is out of scope (spec.md
//! §1's "thinker protocol internals" Non-goal); `Thinker` is the seam that
//! keeps it swappable, the same way the teacher keeps the CLI-vs-API choice
//! behind a client struct in `cli_client.rs`. `HttpThinker` is the default
//! implementation, built on `reqwest`.

use crate::models::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct ThinkerRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThinkerRawResponse {
    pub content: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
}

/// Transport-level failure: the caller (the Thinker Client's retry
/// envelope) decides whether `retryable` warrants another attempt.
#[derive(Debug, thiserror::Error)]
#[error("thinker transport error: {message}")]
pub struct ThinkerTransportError {
    pub message: String,
    pub retryable: bool,
}

impl ThinkerTransportError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: true }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: false }
    }
}

#[async_trait]
pub trait Thinker: Send + Sync {
    async fn complete(
        &self,
        request: ThinkerRequest,
    ) -> Result<ThinkerRawResponse, ThinkerTransportError>;
}

pub struct HttpThinker {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpThinker {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout_seconds: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .expect("reqwest client builder should not fail with only a timeout set");
        Self { client, base_url: base_url.into(), api_key: api_key.into() }
    }
}

#[async_trait]
impl Thinker for HttpThinker {
    async fn complete(
        &self,
        request: ThinkerRequest,
    ) -> Result<ThinkerRawResponse, ThinkerTransportError> {
        let url = format!("{}/v1/complete", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let retryable = e.is_timeout() || e.is_connect();
                ThinkerTransportError { message: e.to_string(), retryable }
            })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ThinkerTransportError::retryable(format!(
                "thinker endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(ThinkerTransportError::fatal(format!(
                "thinker endpoint returned {status}"
            )));
        }

        response
            .json::<ThinkerRawResponse>()
            .await
            .map_err(|e| ThinkerTransportError::fatal(format!("invalid thinker response body: {e}")))
    }
}
