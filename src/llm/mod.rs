//! Client for the generative-text service (Ollama-compatible JSON API).
//!
//! Two operations are consumed: non-streaming text completion and embedding
//! computation. Generation can take minutes on large models, so it gets a
//! much longer timeout than any other network call in the crate.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Config;
use crate::errors::{AppError, AppResult};

const GENERATE_TIMEOUT_SECS: u64 = 300;
const GENERATE_CONNECT_TIMEOUT_SECS: u64 = 10;
const EMBED_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

pub struct LlmClient {
    generate_http: Client,
    embed_http: Client,
    base_url: String,
    model: String,
    embed_model: String,
}

impl LlmClient {
    pub fn new(config: &Config) -> AppResult<Self> {
        let generate_http = Client::builder()
            .timeout(Duration::from_secs(GENERATE_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(GENERATE_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("building generation client: {e}")))?;
        let embed_http = Client::builder()
            .timeout(Duration::from_secs(EMBED_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("building embedding client: {e}")))?;

        Ok(Self {
            generate_http,
            embed_http,
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            model: config.llm_model.clone(),
            embed_model: config.llm_embed_model.clone(),
        })
    }

    /// Single non-streaming completion. Returns the raw model text.
    pub async fn generate(&self, prompt: &str) -> AppResult<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: json!({ "num_ctx": 2048 }),
        };

        let response = self
            .generate_http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("generation request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Network(format!(
                "generation failed: status={status} body={body}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Unexpected(format!("decoding generation response: {e}")))?;
        Ok(parsed.response)
    }

    /// Embedding vector for a text, used by every similarity lookup.
    pub async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let payload = json!({ "model": self.embed_model, "prompt": text });

        let response = self
            .embed_http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("embedding request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Network(format!(
                "embedding failed: status={status} body={body}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Unexpected(format!("decoding embedding response: {e}")))?;
        Ok(parsed.embedding)
    }
}
