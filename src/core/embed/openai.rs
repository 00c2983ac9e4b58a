//! OpenAI-compatible embedding provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::retry::embedding_error;
use super::{preprocess_text, EmbeddingClient};
use crate::core::config::Config;
use crate::core::error::{Error, Result};

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    config: Config,
    client: reqwest::Client,
    dimension: OnceLock<usize>,
}

impl OpenAiEmbedder {
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

    async fn request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let api_key = self.config.get_api_key().ok_or_else(|| Error::Config(
            "no API key configured; set OPENAI_API_KEY or run: codeseek config --api-key KEY"
                .to_string(),
        ))?;

        let url = format!("{}/embeddings", self.config.get_base_url());
        let request = EmbeddingRequest {
            input: texts,
            model: self.config.model.clone(),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| embedding_error(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(embedding_error(Some(status.as_u16()), body));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| embedding_error(None, format!("malformed embedding response: {e}")))?;

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(vec![preprocess_text(text)]).await?;
        vectors
            .pop()
            .ok_or_else(|| embedding_error(None, "provider returned no embedding"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let inputs: Vec<String> = texts.iter().map(|t| preprocess_text(t)).collect();
        let vectors = self.request(inputs).await?;
        if vectors.len() != texts.len() {
            return Err(embedding_error(
                None,
                format!(
                    "provider returned {} embeddings for {} inputs",
                    vectors.len(),
                    texts.len()
                ),
            ));
        }
        Ok(vectors)
    }

    async fn dimension(&self) -> Result<usize> {
        if let Some(&dim) = self.dimension.get() {
            return Ok(dim);
        }
        let probe = self.embed(" ").await?;
        let dim = probe.len();
        Ok(*self.dimension.get_or_init(|| dim))
    }
}
