//! Deterministic offline embedder.
//!
//! Projects sha256 blocks of the input into a fixed-dimension unit vector.
//! Not semantically meaningful, but stable across runs, which makes it
//! useful for tests, dry runs and air-gapped environments.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{preprocess_text, EmbeddingClient};
use crate::core::error::Result;

pub const NULL_EMBEDDER_DIMENSION: usize = 64;

#[derive(Debug, Clone)]
pub struct NullEmbedder {
    dimension: usize,
}

impl Default for NullEmbedder {
    fn default() -> Self {
        Self {
            dimension: NULL_EMBEDDER_DIMENSION,
        }
    }
}

impl NullEmbedder {
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    fn project(&self, text: &str) -> Vec<f32> {
        let text = preprocess_text(text);
        let mut values = Vec::with_capacity(self.dimension);
        let mut counter = 0u32;
        while values.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(counter.to_le_bytes());
            hasher.update(text.as_bytes());
            let digest = hasher.finalize();
            for pair in digest.chunks(2) {
                if values.len() == self.dimension {
                    break;
                }
                let raw = u16::from_le_bytes([pair[0], pair[1]]) as f32;
                values.push(raw / u16::MAX as f32 - 0.5);
            }
            counter += 1;
        }

        let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut values {
                *value /= norm;
            }
        }
        values
    }
}

#[async_trait]
impl EmbeddingClient for NullEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.project(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.project(t)).collect())
    }

    async fn dimension(&self) -> Result<usize> {
        Ok(self.dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_and_unit_norm() {
        let embedder = NullEmbedder::default();
        let a = embedder.embed("fn main() {}").await.unwrap();
        let b = embedder.embed("fn main() {}").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), NULL_EMBEDDER_DIMENSION);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn different_texts_differ() {
        let embedder = NullEmbedder::default();
        let a = embedder.embed("alpha").await.unwrap();
        let b = embedder.embed("beta").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let embedder = NullEmbedder::default();
        let texts = vec!["one".to_string(), "two".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], embedder.embed("one").await.unwrap());
        assert_eq!(batch[1], embedder.embed("two").await.unwrap());
    }
}
