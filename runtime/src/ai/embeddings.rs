use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const MAX_ERROR_DETAIL_CHARS: usize = 500;

/// Embedding intent. Some providers embed documents and queries into
/// different sub-spaces and reject requests that do not say which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Passage,
    Query,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Passage => "passage",
            InputType::Query => "query",
        }
    }
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),
    #[error("embedding request failed: {0}")]
    Network(String),
    #[error("embedding API authentication failed ({status}): {detail}")]
    Authentication { status: StatusCode, detail: String },
    #[error("embedding API rate limit exceeded ({status}): {detail}")]
    RateLimited { status: StatusCode, detail: String },
    #[error("embedding API returned {status}: {detail}")]
    Http { status: StatusCode, detail: String },
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("embedding API returned {returned} vectors for {expected} inputs")]
    CountMismatch { expected: usize, returned: usize },
    #[error("embedding {index} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        expected: usize,
        found: usize,
        index: usize,
    },
    #[error("embedding request cancelled")]
    Cancelled,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    /// Returns one vector per input, in input order.
    async fn embed(
        &self,
        texts: &[String],
        input_type: Option<InputType>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<InputType>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Option<Vec<EmbeddingItem>>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Client for OpenAI-compatible `/v1/embeddings` endpoints.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    http: Client,
    url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5).min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|err| EmbeddingError::Network(err.to_string()))?;
        Ok(Self {
            http,
            url: embeddings_url(endpoint),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn transport_error(&self, err: reqwest::Error) -> EmbeddingError {
        if err.is_timeout() {
            EmbeddingError::Timeout(self.timeout)
        } else {
            EmbeddingError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(
        &self,
        texts: &[String],
        input_type: Option<InputType>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = EmbeddingRequest {
            input: texts,
            model: &self.model,
            input_type,
        };
        debug!(
            url = %self.url,
            inputs = texts.len(),
            input_type = input_type.map(|t| t.as_str()).unwrap_or("-"),
            "sending embedding request"
        );

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|err| self.transport_error(err))?;
        if !status.is_success() {
            return Err(http_status_error(status, &text));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&text)
            .map_err(|err| EmbeddingError::InvalidResponse(err.to_string()))?;
        let mut items = parsed
            .data
            .ok_or_else(|| EmbeddingError::InvalidResponse("missing 'data' field".into()))?;

        if items.iter().all(|item| item.index.is_some()) {
            items.sort_by_key(|item| item.index);
            if let Some((position, item)) = items
                .iter()
                .enumerate()
                .find(|(position, item)| item.index != Some(*position))
            {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "embedding index {} found at position {position}",
                    item.index.unwrap_or_default()
                )));
            }
        }
        if items.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                returned: items.len(),
            });
        }

        Ok(items.into_iter().map(|item| item.embedding).collect())
    }
}

/// Normalizes a configured base URL to its `/v1/embeddings` endpoint.
pub fn embeddings_url(endpoint: &str) -> String {
    let mut base = endpoint.trim().trim_end_matches('/').to_string();
    if let Some(pos) = base.find("/v1/") {
        base.truncate(pos + "/v1".len());
    } else if !base.ends_with("/v1") {
        base.push_str("/v1");
    }
    format!("{base}/embeddings")
}

fn http_status_error(status: StatusCode, body: &str) -> EmbeddingError {
    let detail = extract_error_detail(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            EmbeddingError::Authentication { status, detail }
        }
        StatusCode::TOO_MANY_REQUESTS => EmbeddingError::RateLimited { status, detail },
        _ => EmbeddingError::Http { status, detail },
    }
}

fn extract_error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let candidates = [
            value.pointer("/error/message"),
            value.get("error"),
            value.get("message"),
            value.get("detail"),
        ];
        if let Some(message) = candidates
            .into_iter()
            .flatten()
            .find_map(|candidate| candidate.as_str())
        {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    trimmed.chars().take(MAX_ERROR_DETAIL_CHARS).collect()
}
