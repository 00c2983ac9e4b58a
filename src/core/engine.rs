//! Wires configuration into a ready indexer/searcher pair.

use std::sync::Arc;

use crate::core::config::Config;
use crate::core::embed;
use crate::core::error::Result;
use crate::core::indexer::Indexer;
use crate::core::searcher::Searcher;
use crate::core::store::{DiskVectorStore, VectorStore};

pub struct Engine {
    pub indexer: Indexer,
    pub searcher: Searcher,
}

impl Engine {
    /// Build from the user's config: embedding provider, disk-backed
    /// store, shared registry and sparse-model catalog.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store_dir = config.store_dir()?;
        let embedder = embed::client_from_config(config)?;
        let store: Arc<dyn VectorStore> =
            Arc::new(DiskVectorStore::open(store_dir.join("collections"))?);

        let indexer = Indexer::new(embedder.clone(), store.clone(), store_dir);
        let searcher = Searcher::new(
            embedder,
            store,
            indexer.registry().clone(),
            indexer.bm25_catalog().clone(),
        );

        Ok(Self { indexer, searcher })
    }
}
