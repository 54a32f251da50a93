//! Azure `OpenAI` embeddings client.
//!
//! Calls a single embedding deployment. Throttling (HTTP 429), server
//! errors and transport failures are retried with exponential backoff;
//! any other failure is returned immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::provider::EmbeddingProvider;
use crate::config::AzureOpenAiSettings;
use crate::error::EmbeddingError;
use crate::Result;

/// Delay before the first retry; doubled on each further attempt.
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound on the backoff exponent.
const MAX_BACKOFF_SHIFT: u32 = 5;

/// Embedding provider backed by an Azure `OpenAI` deployment.
#[derive(Debug, Clone)]
pub struct AzureOpenAiProvider {
    client: Client,
    url: String,
    deployment: String,
    dimensions: usize,
    max_attempts: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl AzureOpenAiProvider {
    /// Build a client for the configured deployment.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not a valid header value or the
    /// HTTP client cannot be built.
    pub fn new(settings: AzureOpenAiSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&settings.api_key)
            .map_err(|e| EmbeddingError::Request(format!("invalid API key header: {e}")))?;
        headers.insert("api-key", key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: embeddings_url(
                &settings.endpoint,
                &settings.deployment,
                &settings.api_version,
            ),
            deployment: settings.deployment,
            dimensions: settings.dimensions,
            max_attempts: settings.max_attempts.max(1),
        })
    }

    /// The request URL for this deployment.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EmbeddingProvider for AzureOpenAiProvider {
    fn model_name(&self) -> &str {
        &self.deployment
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let retries_left = attempt < self.max_attempts;

            let response = self
                .client
                .post(&self.url)
                .json(&EmbeddingRequest { input: text })
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
                        EmbeddingError::Response(format!("failed to parse response: {e}"))
                    })?;
                    return parsed
                        .data
                        .into_iter()
                        .next()
                        .map(|d| d.embedding)
                        .ok_or_else(|| EmbeddingError::Response("empty data array".into()).into());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && retries_left {
                        let delay = backoff(attempt);
                        tracing::debug!(%status, attempt, ?delay, "Embedding request throttled, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(EmbeddingError::Request(format!("HTTP {status}: {body}")).into());
                }
                Err(e) => {
                    if is_transient(&e) && retries_left {
                        let delay = backoff(attempt);
                        tracing::debug!(error = %e, attempt, ?delay, "Embedding request failed, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(EmbeddingError::Request(e.to_string()).into());
                }
            }
        }
    }
}

fn embeddings_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{deployment}/embeddings?api-version={api_version}",
        endpoint.trim_end_matches('/')
    )
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Delay after the given (1-based) failed attempt.
fn backoff(attempt: usize) -> Duration {
    let shift = u32::try_from(attempt.saturating_sub(1))
        .unwrap_or(MAX_BACKOFF_SHIFT)
        .min(MAX_BACKOFF_SHIFT);
    BASE_BACKOFF * (1 << shift)
}
