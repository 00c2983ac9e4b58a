//! Embedding provider contract and adapters.
//!
//! The engine only depends on this trait; concrete providers are
//! OpenAI-compatible HTTP (`openai`), Ollama (`ollama`) and a
//! deterministic offline hash projector (`null`) used for tests and
//! air-gapped runs.

mod null;
mod ollama;
mod openai;
pub mod retry;

pub use null::NullEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::error::{Error, Result};

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed one text into a fixed-dimension dense vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch; `result[i]` corresponds to `texts[i]`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Vector dimension; may probe the provider once and cache.
    async fn dimension(&self) -> Result<usize>;
}

impl std::fmt::Debug for dyn EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn EmbeddingClient")
    }
}

/// Providers never see an empty string.
pub fn preprocess_text(text: &str) -> String {
    if text.trim().is_empty() {
        " ".to_string()
    } else {
        text.to_string()
    }
}

pub fn client_from_config(config: &Config) -> Result<Arc<dyn EmbeddingClient>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config.clone())?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config.clone())?)),
        "null" => Ok(Arc::new(NullEmbedder::default())),
        other => Err(Error::Config(format!(
            "unknown embedding provider: {other} (expected openai, ollama or null)"
        ))),
    }
}
