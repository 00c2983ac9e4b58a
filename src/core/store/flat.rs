//! Flat ANN backend over usearch.
//!
//! FAISS-family semantics: append-only, dense-only. Deletion and
//! non-trivial filters are rejected with descriptive errors so callers
//! know a drop-and-recreate is required; the indexer surfaces that
//! instead of hiding it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::filter::FilterExpr;
use super::{HybridSearchRequest, SearchHit, SearchOptions, VectorDocument, VectorStore};
use crate::core::error::{Error, Result};

struct FlatCollection {
    dimension: usize,
    index: Index,
    documents: HashMap<u64, VectorDocument>,
    next_key: u64,
}

impl FlatCollection {
    fn new(dimension: usize) -> Result<Self> {
        let options = IndexOptions {
            dimensions: dimension,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            multi: false,
        };
        let index = Index::new(&options)
            .map_err(|e| Error::Store(format!("failed to create ann index: {e}")))?;
        index
            .reserve(1024)
            .map_err(|e| Error::Store(format!("failed to reserve ann index: {e}")))?;
        Ok(Self {
            dimension,
            index,
            documents: HashMap::new(),
            next_key: 0,
        })
    }

    fn ensure_capacity(&self, incoming: usize) -> Result<()> {
        let needed = self.index.size() + incoming;
        if needed > self.index.capacity() {
            self.index
                .reserve(needed * 2)
                .map_err(|e| Error::Store(format!("failed to grow ann index: {e}")))?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FlatVectorStore {
    collections: RwLock<HashMap<String, FlatCollection>>,
}

impl FlatVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for FlatVectorStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        if collections.contains_key(name) {
            return Err(Error::Store(format!("collection already exists: {name}")));
        }
        collections.insert(name.to_string(), FlatCollection::new(dimension)?);
        Ok(())
    }

    async fn create_hybrid_collection(&self, _name: &str, _dimension: usize) -> Result<()> {
        Err(Error::Store(
            "flat backend is dense-only and cannot create hybrid collections".to_string(),
        ))
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
        if !collections.contains_key(name) {
            return Err(Error::CollectionNotFound(name.to_string()));
        }
        Ok(false)
    }

    async fn insert(&self, name: &str, documents: Vec<VectorDocument>) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;

        for document in &documents {
            if document.dense_vector.len() != collection.dimension {
                return Err(Error::Store(format!(
                    "dimension mismatch in {name}: expected {}, got {}",
                    collection.dimension,
                    document.dense_vector.len()
                )));
            }
        }

        collection.ensure_capacity(documents.len())?;
        for document in documents {
            let key = collection.next_key;
            collection.next_key += 1;
            collection
                .index
                .add(key, &document.dense_vector)
                .map_err(|e| Error::Store(format!("ann insert failed: {e}")))?;
            collection.documents.insert(key, document);
        }
        Ok(())
    }

    async fn insert_hybrid(&self, name: &str, _documents: Vec<VectorDocument>) -> Result<()> {
        Err(Error::Store(format!(
            "flat backend is dense-only, cannot insert hybrid documents into {name}"
        )))
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let collection = collections
            .get(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;

        if let Some(filter) = options.filter.as_deref() {
            if !FilterExpr::parse(filter)?.is_trivial() {
                return Err(Error::UnsupportedFilter(filter.to_string()));
            }
        }
        if collection.documents.is_empty() {
            return Ok(vec![]);
        }

        let matches = collection
            .index
            .search(vector, options.limit)
            .map_err(|e| Error::Store(format!("ann search failed: {e}")))?;

        let mut hits = Vec::with_capacity(matches.keys.len());
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            if let Some(document) = collection.documents.get(key) {
                hits.push(SearchHit {
                    document: document.clone(),
                    // usearch reports cosine distance.
                    score: 1.0 - *distance,
                });
            }
        }
        Ok(hits)
    }

    async fn hybrid_search(
        &self,
        name: &str,
        _request: &HybridSearchRequest,
    ) -> Result<Vec<SearchHit>> {
        Err(Error::Store(format!(
            "flat backend is dense-only, hybrid search is unavailable for {name}"
        )))
    }

    async fn query(
        &self,
        name: &str,
        filter_expr: &str,
        limit: usize,
    ) -> Result<Vec<VectorDocument>> {
        if !FilterExpr::parse(filter_expr)?.is_trivial() {
            return Err(Error::UnsupportedFilter(filter_expr.to_string()));
        }

        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let collection = collections
            .get(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))?;

        let mut documents: Vec<VectorDocument> = collection.documents.values().cloned().collect();
        documents.sort_by(|a, b| {
            a.relative_path
                .cmp(&b.relative_path)
                .then(a.start_line.cmp(&b.start_line))
                .then(a.id.cmp(&b.id))
        });
        documents.truncate(limit);
        Ok(documents)
    }

    async fn delete(&self, name: &str, _ids: &[String]) -> Result<()> {
        Err(Error::UnsupportedDeletion(name.to_string()))
    }

    async fn check_collection_limit(&self, name: &str) -> Result<bool> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        if !collections.contains_key(name) {
            return Err(Error::CollectionNotFound(name.to_string()));
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::document_id;

    fn doc(path: &str, dense: Vec<f32>) -> VectorDocument {
        VectorDocument {
            id: document_id(path, 1, 2, path),
            dense_vector: dense,
            sparse_vector: None,
            content: path.to_string(),
            relative_path: path.to_string(),
            start_line: 1,
            end_line: 2,
            file_extension: ".rs".to_string(),
            metadata: String::new(),
        }
    }

    #[tokio::test]
    async fn dense_search_works() {
        let store = FlatVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store
            .insert(
                "c",
                vec![
                    doc("near.rs", vec![1.0, 0.0]),
                    doc("far.rs", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .search(
                "c",
                &[1.0, 0.05],
                &SearchOptions {
                    limit: 2,
                    filter: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(hits[0].document.relative_path, "near.rs");
    }

    #[tokio::test]
    async fn deletion_is_rejected() {
        let store = FlatVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        let err = store.delete("c", &["x".to_string()]).await.unwrap_err();
        assert_eq!(err.kind(), "unsupported_deletion");
        assert!(err.to_string().contains("recreate"));
    }

    #[tokio::test]
    async fn non_trivial_filters_are_rejected() {
        let store = FlatVectorStore::new();
        store.create_collection("c", 2).await.unwrap();
        store.insert("c", vec![doc("a.rs", vec![1.0, 0.0])]).await.unwrap();

        let err = store
            .query("c", "relativePath == 'a.rs'", 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unsupported_filter");

        // Trivial scroll still lists documents.
        let all = store.query("c", "", 10).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn hybrid_operations_are_rejected() {
        let store = FlatVectorStore::new();
        assert!(store.create_hybrid_collection("c", 2).await.is_err());
        store.create_collection("c", 2).await.unwrap();
        assert!(!store.is_hybrid("c").await.unwrap());
        assert!(store.insert_hybrid("c", vec![]).await.is_err());
    }
}
