//! In-memory vector store.
//!
//! Brute-force cosine over dense vectors, sparse dot product for the
//! keyword branch and server-side RRF for hybrid requests. Small enough
//! to be exact, which makes it the reference backend for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use super::filter::FilterExpr;
use super::{
    cosine_similarity, HybridSearchRequest, SearchHit, SearchOptions, SparseBranch, VectorDocument,
    VectorStore,
};
use crate::core::error::{Error, Result};
use crate::core::fusion::{reciprocal_rank_fusion, RRF_K};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CollectionData {
    pub dimension: usize,
    pub hybrid: bool,
    pub documents: HashMap<String, VectorDocument>,
}

pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, CollectionData>>,
    /// When set, `check_collection_limit` reports false at this many docs.
    document_cap: Option<usize>,
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            document_cap: None,
        }
    }

    pub fn with_document_cap(cap: usize) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            document_cap: Some(cap),
        }
    }

    fn create(&self, name: &str, dimension: usize, hybrid: bool) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        if collections.contains_key(name) {
            return Err(Error::Store(format!("collection already exists: {name}")));
        }
        collections.insert(
            name.to_string(),
            CollectionData {
                dimension,
                hybrid,
                documents: HashMap::new(),
            },
        );
        Ok(())
    }

    fn insert_documents(
        &self,
        name: &str,
        documents: Vec<VectorDocument>,
        require_sparse: bool,
    ) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;

        if require_sparse && !collection.hybrid {
            return Err(Error::Store(format!(
                "collection {name} is dense-only, cannot insert hybrid documents"
            )));
        }

        for document in &documents {
            if document.dense_vector.len() != collection.dimension {
                return Err(Error::Store(format!(
                    "dimension mismatch in {name}: expected {}, got {}",
                    collection.dimension,
                    document.dense_vector.len()
                )));
            }
            if collection.hybrid && document.sparse_vector.is_none() {
                return Err(Error::Store(format!(
                    "hybrid collection {name} requires a sparse vector on every document"
                )));
            }
        }

        for document in documents {
            collection.documents.insert(document.id.clone(), document);
        }
        Ok(())
    }

    fn filtered_documents(
        &self,
        name: &str,
        filter: Option<&str>,
    ) -> Result<Vec<VectorDocument>> {
        let parsed = match filter {
            Some(expr) => FilterExpr::parse(expr)?,
            None => FilterExpr::All,
        };
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let collection = collections
            .get(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;
        Ok(collection
            .documents
            .values()
            .filter(|document| parsed.matches(document))
            .cloned()
            .collect())
    }

    pub(crate) fn export_collections(&self) -> HashMap<String, CollectionData> {
        self.collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn import_collection(&self, name: String, data: CollectionData) {
        self.collections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, data);
    }
}

fn dense_ranking(documents: &[VectorDocument], vector: &[f32], limit: usize) -> Vec<(String, f32)> {
    let mut scored: Vec<(String, f32)> = documents
        .iter()
        .map(|document| {
            (
                document.id.clone(),
                cosine_similarity(vector, &document.dense_vector),
            )
        })
        .collect();
    scored.sort_by(|(id_a, a), (id_b, b)| {
        b.partial_cmp(a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| id_a.cmp(id_b))
    });
    scored.truncate(limit);
    scored
}

fn sparse_ranking(
    documents: &[VectorDocument],
    query: &crate::core::bm25::SparseVector,
    limit: usize,
) -> Vec<(String, f32)> {
    let mut scored: Vec<(String, f32)> = documents
        .iter()
        .filter_map(|document| {
            let sparse = document.sparse_vector.as_ref()?;
            let score = query.dot(sparse);
            (score != 0.0).then(|| (document.id.clone(), score))
        })
        .collect();
    scored.sort_by(|(id_a, a), (id_b, b)| {
        b.partial_cmp(a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| id_a.cmp(id_b))
    });
    scored.truncate(limit);
    scored
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.create(name, dimension, false)
    }

    async fn create_hybrid_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.create(name, dimension, true)
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        collections.remove(name);
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        Ok(collections.contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn is_hybrid(&self, name: &str) -> Result<bool> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        collections
            .get(name)
            .map(|c| c.hybrid)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }

    async fn insert(&self, name: &str, documents: Vec<VectorDocument>) -> Result<()> {
        self.insert_documents(name, documents, false)
    }

    async fn insert_hybrid(&self, name: &str, documents: Vec<VectorDocument>) -> Result<()> {
        self.insert_documents(name, documents, true)
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let documents = self.filtered_documents(name, options.filter.as_deref())?;
        let ranking = dense_ranking(&documents, vector, options.limit);

        let by_id: HashMap<&str, &VectorDocument> = documents
            .iter()
            .map(|document| (document.id.as_str(), document))
            .collect();
        Ok(ranking
            .into_iter()
            .filter_map(|(id, score)| {
                by_id.get(id.as_str()).map(|&document| SearchHit {
                    document: document.clone(),
                    score,
                })
            })
            .collect())
    }

    async fn hybrid_search(
        &self,
        name: &str,
        request: &HybridSearchRequest,
    ) -> Result<Vec<SearchHit>> {
        if !self.is_hybrid(name).await? {
            return Err(Error::Store(format!(
                "collection {name} is dense-only, hybrid search is unavailable"
            )));
        }

        let sparse_query = match &request.sparse {
            SparseBranch::Vector(vector) => vector.clone(),
            SparseBranch::Text(_) => {
                return Err(Error::Store(
                    "this backend has no server-side analyzer; send a sparse vector".to_string(),
                ))
            }
        };

        let documents = self.filtered_documents(name, request.filter.as_deref())?;
        let dense: Vec<String> = dense_ranking(&documents, &request.dense, request.limit)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let sparse: Vec<String> = sparse_ranking(&documents, &sparse_query, request.limit)
            .into_iter()
            .map(|(id, _)| id)
            .collect();

        let fused = reciprocal_rank_fusion(&dense, &sparse, RRF_K);

        let by_id: HashMap<&str, &VectorDocument> = documents
            .iter()
            .map(|document| (document.id.as_str(), document))
            .collect();
        Ok(fused
            .into_iter()
            .filter_map(|(id, score)| {
                by_id.get(id.as_str()).map(|&document| SearchHit {
                    document: document.clone(),
                    score,
                })
            })
            .collect())
    }

    async fn query(
        &self,
        name: &str,
        filter_expr: &str,
        limit: usize,
    ) -> Result<Vec<VectorDocument>> {
        let mut documents = self.filtered_documents(name, Some(filter_expr))?;
        documents.sort_by(|a, b| {
            a.relative_path
                .cmp(&b.relative_path)
                .then(a.start_line.cmp(&b.start_line))
                .then(a.id.cmp(&b.id))
        });
        documents.truncate(limit);
        Ok(documents)
    }

    async fn delete(&self, name: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;
        for id in ids {
            collection.documents.remove(id);
        }
        Ok(())
    }

    async fn check_collection_limit(&self, name: &str) -> Result<bool> {
        let Some(cap) = self.document_cap else {
            return Ok(true);
        };
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let collection = collections
            .get(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;
        Ok(collection.documents.len() < cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bm25::SparseVector;
    use crate::core::store::document_id;

    fn doc(path: &str, dense: Vec<f32>, sparse: Option<SparseVector>) -> VectorDocument {
        VectorDocument {
            id: document_id(path, 1, 5, path),
            dense_vector: dense,
            sparse_vector: sparse,
            content: format!("content of {path}"),
            relative_path: path.to_string(),
            start_line: 1,
            end_line: 5,
            file_extension: format!(
                ".{}",
                path.rsplit('.').next().unwrap_or_default()
            ),
            metadata: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn collection_lifecycle() {
        let store = MemoryVectorStore::new();
        assert!(!store.has_collection("c").await.unwrap());

        store.create_hybrid_collection("c", 2).await.unwrap();
        assert!(store.has_collection("c").await.unwrap());
        assert!(store.is_hybrid("c").await.unwrap());
        assert_eq!(store.list_collections().await.unwrap(), vec!["c"]);

        assert!(store.create_collection("c", 2).await.is_err());

        store.drop_collection("c").await.unwrap();
        assert!(!store.has_collection("c").await.unwrap());
        // Dropping again is fine.
        store.drop_collection("c").await.unwrap();
    }

    #[tokio::test]
    async fn insert_validates_dimension_and_sparse_presence() {
        let store = MemoryVectorStore::new();
        store.create_hybrid_collection("c", 2).await.unwrap();

        let bad_dim = doc("a.rs", vec![1.0, 0.0, 0.0], None);
        assert!(store.insert_hybrid("c", vec![bad_dim]).await.is_err());

        let missing_sparse = doc("a.rs", vec![1.0, 0.0], None);
        assert!(store.insert_hybrid("c", vec![missing_sparse]).await.is_err());

        let ok = doc(
            "a.rs",
            vec![1.0, 0.0],
            Some(SparseVector {
                indices: vec![0],
                values: vec![1.0],
            }),
        );
        store.insert_hybrid("c", vec![ok]).await.unwrap();
    }

    #[tokio::test]
    async fn dense_search_ranks_by_cosine() {
        let store = MemoryVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .insert(
                "c",
                vec![
                    doc("near.rs", vec![1.0, 0.0], None),
                    doc("far.rs", vec![0.0, 1.0], None),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .search(
                "c",
                &[1.0, 0.1],
                &SearchOptions {
                    limit: 2,
                    filter: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(hits[0].document.relative_path, "near.rs");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn hybrid_search_fuses_branches() {
        let store = MemoryVectorStore::new();
        store.create_hybrid_collection("c", 2).await.unwrap();
        store
            .insert_hybrid(
                "c",
                vec![
                    doc(
                        "both.rs",
                        vec![1.0, 0.0],
                        Some(SparseVector {
                            indices: vec![0],
                            values: vec![1.0],
                        }),
                    ),
                    doc(
                        "dense_only.rs",
                        vec![0.9, 0.1],
                        Some(SparseVector {
                            indices: vec![5],
                            values: vec![1.0],
                        }),
                    ),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .hybrid_search(
                "c",
                &HybridSearchRequest {
                    dense: vec![1.0, 0.0],
                    sparse: SparseBranch::Vector(SparseVector {
                        indices: vec![0],
                        values: vec![1.0],
                    }),
                    limit: 10,
                    filter: None,
                },
            )
            .await
            .unwrap();

        // Present in both branches beats present in one.
        assert_eq!(hits[0].document.relative_path, "both.rs");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn query_and_delete_by_filter() {
        let store = MemoryVectorStore::new();
        store.create_collection("c", 1).await.unwrap();
        store
            .insert(
                "c",
                vec![
                    doc("a.py", vec![1.0], None),
                    doc("b.py", vec![1.0], None),
                    doc("c.rs", vec![1.0], None),
                ],
            )
            .await
            .unwrap();

        let pys = store
            .query("c", "fileExtension == '.py'", 100)
            .await
            .unwrap();
        assert_eq!(pys.len(), 2);
        assert_eq!(pys[0].relative_path, "a.py");

        let target = store
            .query("c", "relativePath == 'b.py'", 100)
            .await
            .unwrap();
        let ids: Vec<String> = target.into_iter().map(|d| d.id).collect();
        store.delete("c", &ids).await.unwrap();

        let remaining = store.query("c", "", 100).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(store
            .query("c", "relativePath == 'b.py'", 100)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn bad_filter_is_rejected() {
        let store = MemoryVectorStore::new();
        store.create_collection("c", 1).await.unwrap();
        let err = store.query("c", "relativePath ~= 'x'", 10).await.unwrap_err();
        assert_eq!(err.kind(), "unsupported_filter");
    }

    #[tokio::test]
    async fn document_cap_drives_collection_limit() {
        let store = MemoryVectorStore::with_document_cap(2);
        store.create_collection("c", 1).await.unwrap();
        assert!(store.check_collection_limit("c").await.unwrap());

        store
            .insert(
                "c",
                vec![doc("a.rs", vec![1.0], None), doc("b.rs", vec![1.0], None)],
            )
            .await
            .unwrap();
        assert!(!store.check_collection_limit("c").await.unwrap());
    }

    #[tokio::test]
    async fn missing_collection_is_collection_not_found() {
        let store = MemoryVectorStore::new();
        let err = store.insert("nope", vec![]).await.unwrap_err();
        assert_eq!(err.kind(), "collection_not_found");
    }
}
