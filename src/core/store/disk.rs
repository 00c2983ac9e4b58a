//! Filesystem-backed vector store.
//!
//! Memory-store semantics with each collection persisted as a bincode
//! segment under the store directory. Collections load at open and every
//! mutation rewrites the owning segment atomically.

use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use super::memory::{CollectionData, MemoryVectorStore};
use super::{HybridSearchRequest, SearchHit, SearchOptions, VectorDocument, VectorStore};
use crate::core::error::{Error, Result};

const SEGMENT_SUFFIX: &str = ".collection.bin";

pub struct DiskVectorStore {
    inner: MemoryVectorStore,
    dir: PathBuf,
}

impl DiskVectorStore {
    pub fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        let inner = MemoryVectorStore::new();

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(name) = file_name.strip_suffix(SEGMENT_SUFFIX) else {
                continue;
            };
            match fs::read(&path) {
                Ok(bytes) => match bincode::deserialize::<CollectionData>(&bytes) {
                    Ok(data) => inner.import_collection(name.to_string(), data),
                    Err(e) => {
                        warn!(collection = name, error = %e, "skipping corrupt collection segment");
                    }
                },
                Err(e) => {
                    warn!(collection = name, error = %e, "failed to read collection segment");
                }
            }
        }

        Ok(Self { inner, dir })
    }

    fn segment_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}{SEGMENT_SUFFIX}"))
    }

    fn persist(&self, name: &str) -> Result<()> {
        let collections = self.inner.export_collections();
        let Some(data) = collections.get(name) else {
            return Ok(());
        };
        let bytes = bincode::serialize(data)
            .map_err(|e| Error::Store(format!("failed to serialize collection {name}: {e}")))?;
        let path = self.segment_path(name);
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for DiskVectorStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.inner.create_collection(name, dimension).await?;
        self.persist(name)
    }

    async fn create_hybrid_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.inner.create_hybrid_collection(name, dimension).await?;
        self.persist(name)
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.inner.drop_collection(name).await?;
        match fs::remove_file(self.segment_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        self.inner.has_collection(name).await
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.inner.list_collections().await
    }

    async fn is_hybrid(&self, name: &str) -> Result<bool> {
        self.inner.is_hybrid(name).await
    }

    async fn insert(&self, name: &str, documents: Vec<VectorDocument>) -> Result<()> {
        self.inner.insert(name, documents).await?;
        self.persist(name)
    }

    async fn insert_hybrid(&self, name: &str, documents: Vec<VectorDocument>) -> Result<()> {
        self.inner.insert_hybrid(name, documents).await?;
        self.persist(name)
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        self.inner.search(name, vector, options).await
    }

    async fn hybrid_search(
        &self,
        name: &str,
        request: &HybridSearchRequest,
    ) -> Result<Vec<SearchHit>> {
        self.inner.hybrid_search(name, request).await
    }

    async fn query(
        &self,
        name: &str,
        filter_expr: &str,
        limit: usize,
    ) -> Result<Vec<VectorDocument>> {
        self.inner.query(name, filter_expr, limit).await
    }

    async fn delete(&self, name: &str, ids: &[String]) -> Result<()> {
        self.inner.delete(name, ids).await?;
        self.persist(name)
    }

    async fn check_collection_limit(&self, name: &str) -> Result<bool> {
        self.inner.check_collection_limit(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bm25::SparseVector;
    use crate::core::store::document_id;
    use tempfile::TempDir;

    fn doc(path: &str) -> VectorDocument {
        VectorDocument {
            id: document_id(path, 1, 3, path),
            dense_vector: vec![1.0, 0.0],
            sparse_vector: Some(SparseVector {
                indices: vec![0],
                values: vec![0.5],
            }),
            content: format!("body of {path}"),
            relative_path: path.to_string(),
            start_line: 1,
            end_line: 3,
            file_extension: ".rs".to_string(),
            metadata: "{\"k\":\"v\"}".to_string(),
        }
    }

    #[tokio::test]
    async fn collections_survive_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let store = DiskVectorStore::open(dir.path().to_path_buf()).unwrap();
            store.create_hybrid_collection("c", 2).await.unwrap();
            store.insert_hybrid("c", vec![doc("a.rs")]).await.unwrap();
        }

        let store = DiskVectorStore::open(dir.path().to_path_buf()).unwrap();
        assert!(store.has_collection("c").await.unwrap());
        assert!(store.is_hybrid("c").await.unwrap());

        let documents = store.query("c", "", 10).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].relative_path, "a.rs");
        assert_eq!(documents[0].metadata, "{\"k\":\"v\"}");
    }

    #[tokio::test]
    async fn drop_removes_segment_file() {
        let dir = TempDir::new().unwrap();
        let store = DiskVectorStore::open(dir.path().to_path_buf()).unwrap();
        store.create_collection("c", 2).await.unwrap();
        assert!(dir.path().join("c.collection.bin").exists());

        store.drop_collection("c").await.unwrap();
        assert!(!dir.path().join("c.collection.bin").exists());

        let reopened = DiskVectorStore::open(dir.path().to_path_buf()).unwrap();
        assert!(!reopened.has_collection("c").await.unwrap());
    }

    #[tokio::test]
    async fn delete_persists() {
        let dir = TempDir::new().unwrap();
        {
            let store = DiskVectorStore::open(dir.path().to_path_buf()).unwrap();
            store.create_hybrid_collection("c", 2).await.unwrap();
            let d = doc("a.rs");
            let id = d.id.clone();
            store.insert_hybrid("c", vec![d, doc("b.rs")]).await.unwrap();
            store.delete("c", &[id]).await.unwrap();
        }

        let store = DiskVectorStore::open(dir.path().to_path_buf()).unwrap();
        let documents = store.query("c", "", 10).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].relative_path, "b.rs");
    }
}
