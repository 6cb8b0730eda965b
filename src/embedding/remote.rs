//! HTTP embedding providers (OpenAI and Ollama).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;

const OPENAI_URL: &str = "https://api.openai.com/v1/embeddings";
const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. `OPENAI_API_KEY`
/// is read when the provider is built, but a missing key only fails the
/// first embedding call, so a chat session can start without one.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: Option<String>,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(OPENAI_KEY_VAR).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!("{} is not set; embedding calls will fail", OPENAI_KEY_VAR);
        }
        Self::with_api_key(config, api_key)
    }

    fn with_api_key(config: &EmbeddingConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let (model, dims) = model_and_dims(config, "OpenAI")?;
        Ok(Self {
            model,
            dims,
            api_key,
            client: build_client(config)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(EmbeddingError::MissingApiKey(OPENAI_KEY_VAR))?;
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(OPENAI_URL)
            .bearer_auth(api_key)
            .json(&body);

        let json = send_with_retry("OpenAI", request, self.max_retries).await?;
        let vectors = parse_openai_response(&json)?;
        check_count(texts.len(), vectors)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index` field.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("OpenAI", "missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| invalid("OpenAI", "missing embedding"))?;
        indexed.push((index, parse_vector(embedding, "OpenAI")?));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
/// Requires Ollama to be running with an embedding model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let (model, dims) = model_and_dims(config, "Ollama")?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            client: build_client(config)?,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body);

        let json = send_with_retry("Ollama", request, self.max_retries).await?;
        let vectors = parse_ollama_response(&json)?;
        check_count(texts.len(), vectors)
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| invalid("Ollama", "missing embeddings array"))?
        .iter()
        .map(|embedding| parse_vector(embedding, "Ollama"))
        .collect()
}

// ============ Shared HTTP plumbing ============

fn model_and_dims(config: &EmbeddingConfig, provider: &str) -> anyhow::Result<(String, usize)> {
    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required for {} provider", provider))?;
    let dims = config
        .dims
        .ok_or_else(|| anyhow::anyhow!("embedding.dims required for {} provider", provider))?;
    Ok((model, dims))
}

fn build_client(config: &EmbeddingConfig) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Send a JSON request, retrying rate limits, server errors, and transport
/// failures with exponential backoff.
async fn send_with_retry(
    provider: &'static str,
    request: reqwest::RequestBuilder,
    max_retries: u32,
) -> Result<Value, EmbeddingError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(provider, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        // JSON bodies are always cloneable; a builder that is not would be a bug here.
        let Some(attempt_request) = request.try_clone() else {
            return Err(invalid(provider, "request body cannot be retried"));
        };

        match attempt_request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|source| EmbeddingError::Transport { provider, source });
                }

                let body = response.text().await.unwrap_or_default();
                let err = EmbeddingError::Api {
                    provider,
                    status: status.as_u16(),
                    body,
                };

                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(provider, status = status.as_u16(), "transient embedding API error");
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(source) => {
                tracing::warn!(provider, error = %source, "embedding request failed");
                last_err = Some(EmbeddingError::Transport { provider, source });
            }
        }
    }

    Err(last_err.unwrap_or_else(|| invalid(provider, "no attempts were made")))
}

fn parse_vector(value: &Value, provider: &'static str) -> Result<Vec<f32>, EmbeddingError> {
    value
        .as_array()
        .ok_or_else(|| invalid(provider, "embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| invalid(provider, "embedding contains a non-number"))
        })
        .collect()
}

fn check_count(expected: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vectors.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            got: vectors.len(),
        });
    }
    Ok(vectors)
}

fn invalid(provider: &'static str, reason: &str) -> EmbeddingError {
    EmbeddingError::InvalidResponse {
        provider,
        reason: reason.to_string(),
    }
}
