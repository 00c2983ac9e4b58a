//! Ollama embedding provider (one prompt per request).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::retry::embedding_error;
use super::{preprocess_text, EmbeddingClient};
use crate::core::config::Config;
use crate::core::error::{Error, Result};

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

pub struct OllamaEmbedder {
    config: Config,
    client: reqwest::Client,
    dimension: OnceLock<usize>,
}

impl OllamaEmbedder {
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            config,
            client,
            dimension: OnceLock::new(),
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.config.get_ollama_url());
        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: preprocess_text(text),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| embedding_error(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(embedding_error(Some(status.as_u16()), body));
        }

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| embedding_error(None, format!("malformed embedding response: {e}")))?;
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Ollama has no batch endpoint; sequential calls keep order.
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.request(text).await?);
        }
        Ok(vectors)
    }

    async fn dimension(&self) -> Result<usize> {
        if let Some(&dim) = self.dimension.get() {
            return Ok(dim);
        }
        let probe = self.embed(" ").await?;
        if probe.is_empty() {
            return Err(Error::Embedding {
                message: "provider returned a zero-dimension embedding".to_string(),
                retryable: false,
            });
        }
        let dim = probe.len();
        Ok(*self.dimension.get_or_init(|| dim))
    }
}
