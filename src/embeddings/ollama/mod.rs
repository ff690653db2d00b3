
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::RagError;
use crate::answer::ChatModel;
use crate::config::OllamaConfig;
use crate::embeddings::{Embedder, EmbeddingError};

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Upper bound on attempts per request, first try included
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Which Ollama endpoint embeddings are requested from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingApi {
    /// `POST /api/embeddings`, one request per text
    #[default]
    Legacy,
    /// `POST /api/embed`, one request per batch
    Batch,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    chat_model: String,
    api: EmbeddingApi,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    #[serde(rename = "input")]
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            api: config.embedding_api,
            agent,
            retry_attempts: config.retry_attempts.clamp(1, MAX_RETRY_ATTEMPTS),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.clamp(1, MAX_RETRY_ATTEMPTS);
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Test connection to Ollama server and verify both models are available
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().context("Server ping failed")?;

        for model in [&self.embedding_model, &self.chat_model] {
            if !models.iter().any(|m| &m.name == model || m.name == format!("{model}:latest")) {
                let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
                warn!("Model {} not found. Available models: {:?}", model, available);
                return Err(anyhow::anyhow!(
                    "Model '{}' is not available. Try running: ollama pull {}",
                    model,
                    model
                ));
            }
        }

        info!(
            "Health check passed for Ollama server at {} with models {} and {}",
            self.base_url, self.embedding_model, self.chat_model
        );
        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate the embedding for a single text through `/api/embeddings`
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            model: &self.embedding_model,
            prompt: text,
        };
        let response_text = self.post_json("/api/embeddings", &request)?;

        let response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if response.embedding.is_empty() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "empty embedding returned by model {}",
                self.embedding_model
            )));
        }

        debug!(
            "Generated embedding with {} dimensions",
            response.embedding.len()
        );
        Ok(response.embedding)
    }

    /// Generate embeddings for several texts with one `/api/embed` request
    #[inline]
    pub fn generate_embeddings_single_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = BatchEmbedRequest {
            model: &self.embedding_model,
            inputs: texts,
        };
        let response_text = self.post_json("/api/embed", &request)?;

        let response: BatchEmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if response.embeddings.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: response.embeddings.len(),
            });
        }

        Ok(response.embeddings)
    }

    /// Send a single-turn, non-streaming chat request and return the reply text
    #[inline]
    pub fn generate_chat(&self, prompt: &str) -> Result<String, EmbeddingError> {
        debug!(
            "Requesting chat completion from {} (prompt length: {})",
            self.chat_model,
            prompt.len()
        );

        let request = ChatRequest {
            model: &self.chat_model,
            stream: false,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let response_text = self.post_json("/api/chat", &request)?;

        let response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        response.message.map(|m| m.content).ok_or_else(|| {
            EmbeddingError::InvalidResponse(format!(
                "Ollama did not return a chat message for model {} (prompt length: {} chars). Try running: ollama pull {}",
                self.chat_model,
                prompt.len(),
                self.chat_model
            ))
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, EmbeddingError> {
        self.base_url
            .join(path)
            .map_err(|e| EmbeddingError::Url(format!("{}{}: {}", self.base_url, path, e)))
    }

    fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<String, EmbeddingError> {
        let url = self.endpoint(path)?;
        let request_json = serde_json::to_string(body)
            .map_err(|e| EmbeddingError::Request(format!("failed to serialize request: {e}")))?;

        self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String, EmbeddingError>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(ureq::Error::StatusCode(status)) if status < 500 => {
                    warn!("Client error (status {}), not retrying", status);
                    return Err(EmbeddingError::Status(status));
                }
                Err(ureq::Error::StatusCode(status)) => {
                    warn!(
                        "Server error (status {}), attempt {}/{}",
                        status, attempt, self.retry_attempts
                    );
                    last_error = Some(EmbeddingError::Status(status));
                }
                Err(
                    error @ (ureq::Error::ConnectionFailed
                    | ureq::Error::HostNotFound
                    | ureq::Error::Timeout(_)
                    | ureq::Error::Io(_)),
                ) => {
                    warn!(
                        "Transport error: {}, attempt {}/{}",
                        error, attempt, self.retry_attempts
                    );
                    last_error = Some(EmbeddingError::Request(error.to_string()));
                }
                Err(error) => {
                    warn!("Non-retryable error: {}", error);
                    return Err(EmbeddingError::Request(error.to_string()));
                }
            }

            if attempt < self.retry_attempts {
                let delay = Duration::from_millis(
                    EXPONENTIAL_BACKOFF_BASE
                        .saturating_pow(attempt - 1)
                        .saturating_mul(1000),
                );
                debug!("Waiting {:?} before retry", delay);
                std::thread::sleep(delay);
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error
            .unwrap_or_else(|| EmbeddingError::Request("request failed after retries".to_string())))
    }
}

impl Embedder for OllamaClient {
    #[inline]
    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match self.api {
            EmbeddingApi::Legacy => texts
                .iter()
                .map(|text| self.generate_embedding(text))
                .collect(),
            EmbeddingApi::Batch => self.generate_embeddings_single_batch(texts),
        }
    }
}

impl ChatModel for OllamaClient {
    #[inline]
    fn model_name(&self) -> &str {
        &self.chat_model
    }

    #[inline]
    fn complete(&self, prompt: &str) -> crate::Result<String> {
        self.generate_chat(prompt)
            .map_err(|e| RagError::Chat(format!("{} did not answer: {}", self.chat_model, e)))
    }
}
