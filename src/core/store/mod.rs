//! Vector store contract and backends.
//!
//! Three backends ship with the engine: `memory` (brute-force, used by
//! tests and small runs), `disk` (memory semantics persisted as bincode
//! segments) and `flat` (usearch ANN, append-only; it surfaces the
//! deletion and filter limitations of FAISS-family indexes instead of
//! papering over them).

pub mod disk;
pub mod filter;
pub mod flat;
pub mod memory;

pub use disk::DiskVectorStore;
pub use flat::FlatVectorStore;
pub use memory::MemoryVectorStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::bm25::SparseVector;
use crate::core::error::Result;

/// Document fields as stored per collection entry. `metadata` is a
/// JSON-encoded string, opaque to the store; it round-trips by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub dense_vector: Vec<f32>,
    #[serde(default)]
    pub sparse_vector: Option<SparseVector>,
    pub content: String,
    pub relative_path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub file_extension: String,
    #[serde(default)]
    pub metadata: String,
}

/// Stable document id: UUID v5 over path, span and content hash.
pub fn document_id(
    relative_path: &str,
    start_line: usize,
    end_line: usize,
    content_hash: &str,
) -> String {
    let seed = format!("{relative_path}:{start_line}:{end_line}:{content_hash}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes()).to_string()
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document: VectorDocument,
    pub score: f32,
}

/// Sparse branch of a hybrid request: either a precomputed sparse vector
/// or raw text for stores that tokenise server-side.
#[derive(Debug, Clone)]
pub enum SparseBranch {
    Vector(SparseVector),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct HybridSearchRequest {
    pub dense: Vec<f32>,
    pub sparse: SparseBranch,
    /// Per-branch prefetch size.
    pub limit: usize,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: usize,
    pub filter: Option<String>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;
    async fn create_hybrid_collection(&self, name: &str, dimension: usize) -> Result<()>;
    async fn drop_collection(&self, name: &str) -> Result<()>;
    async fn has_collection(&self, name: &str) -> Result<bool>;
    async fn list_collections(&self) -> Result<Vec<String>>;
    /// Whether the named collection stores sparse vectors alongside dense.
    async fn is_hybrid(&self, name: &str) -> Result<bool>;

    async fn insert(&self, name: &str, documents: Vec<VectorDocument>) -> Result<()>;
    async fn insert_hybrid(&self, name: &str, documents: Vec<VectorDocument>) -> Result<()>;

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>>;
    async fn hybrid_search(
        &self,
        name: &str,
        request: &HybridSearchRequest,
    ) -> Result<Vec<SearchHit>>;

    /// Filtered scroll over stored documents.
    async fn query(
        &self,
        name: &str,
        filter_expr: &str,
        limit: usize,
    ) -> Result<Vec<VectorDocument>>;
    async fn delete(&self, name: &str, ids: &[String]) -> Result<()>;

    /// `false` when the backend is near capacity; the indexer treats that
    /// as the `limit_reached` terminal status.
    async fn check_collection_limit(&self, name: &str) -> Result<bool>;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
