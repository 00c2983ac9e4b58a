//! Query-time hybrid retrieval.
//!
//! Embeds the query, pairs it with a sparse BM25 vector when the
//! collection is hybrid, issues the store request with a 2x prefetch and
//! RRF fusion, then applies threshold and extension filters and shapes
//! the rows. Searching while indexing is permitted; the response flags it.

use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::bm25::{Bm25Catalog, GenerateOptions};
use crate::core::collection;
use crate::core::embed::EmbeddingClient;
use crate::core::error::{Error, Result};
use crate::core::status::StatusRegistry;
use crate::core::store::{
    HybridSearchRequest, SearchHit, SearchOptions as StoreSearchOptions, SparseBranch, VectorStore,
};

/// Sparse query terms kept per request.
const QUERY_MAX_TERMS: usize = 256;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub threshold: Option<f32>,
    pub extension_filter: Option<Vec<String>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            threshold: None,
            extension_filter: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub content: String,
    pub relative_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub language: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    /// True when the codebase is still being indexed; results may be
    /// partial.
    pub indexing: bool,
}

pub struct Searcher {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    registry: StatusRegistry,
    bm25_catalog: Bm25Catalog,
    /// Collections already warned about a missing or untrained sparse
    /// model, once per collection per searcher.
    warned_untrained: Mutex<HashSet<String>>,
}

impl Searcher {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        registry: StatusRegistry,
        bm25_catalog: Bm25Catalog,
    ) -> Self {
        Self {
            embedder,
            store,
            registry,
            bm25_catalog,
            warned_untrained: Mutex::new(HashSet::new()),
        }
    }

    pub async fn search(
        &self,
        root: &Path,
        query: &str,
        options: SearchOptions,
        cancel: CancellationToken,
    ) -> Result<SearchResponse> {
        let extension_filter = validate_extension_filter(options.extension_filter.as_deref())?;

        let canonical = collection::canonical_root(root)?;
        let root_key = canonical.to_string_lossy().to_string();
        let name = collection::collection_name(&canonical);

        // Indexed or still Indexing are both searchable; anything else is
        // a missing index.
        let indexing = match self.registry.get(&root_key) {
            Some(entry) if entry.is_indexed() => false,
            Some(entry) if entry.is_indexing() => true,
            _ => return Err(Error::NotIndexed(root_key)),
        };
        if !self.store.has_collection(&name).await? {
            return Err(Error::NotIndexed(root_key));
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let dense = self.embedder.embed(query).await?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let prefetch = options.limit.saturating_mul(2).max(1);
        let hits = if self.store.is_hybrid(&name).await? {
            match self.sparse_query(&name, query)? {
                Some(sparse) => {
                    self.store
                        .hybrid_search(
                            &name,
                            &HybridSearchRequest {
                                dense,
                                sparse: SparseBranch::Vector(sparse),
                                limit: prefetch,
                                filter: None,
                            },
                        )
                        .await?
                }
                None => self.dense_search(&name, dense, prefetch).await?,
            }
        } else {
            self.dense_search(&name, dense, prefetch).await?
        };

        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .filter(|hit| match options.threshold {
                Some(threshold) => hit.score >= threshold,
                None => true,
            })
            .filter(|hit| match &extension_filter {
                Some(extensions) => {
                    let ext = hit.document.file_extension.to_lowercase();
                    extensions.iter().any(|candidate| *candidate == ext)
                }
                None => true,
            })
            .take(options.limit)
            .map(shape_result)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(SearchResponse { results, indexing })
    }

    async fn dense_search(
        &self,
        name: &str,
        dense: Vec<f32>,
        prefetch: usize,
    ) -> Result<Vec<SearchHit>> {
        self.store
            .search(
                name,
                &dense,
                &StoreSearchOptions {
                    limit: prefetch,
                    filter: None,
                },
            )
            .await
    }

    /// Sparse half of the query, or `None` to degrade to dense-only.
    fn sparse_query(
        &self,
        name: &str,
        query: &str,
    ) -> Result<Option<crate::core::bm25::SparseVector>> {
        let model = match self.bm25_catalog.load(name)? {
            Some(model) if model.is_trained() => model,
            _ => {
                let mut warned = self
                    .warned_untrained
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                if warned.insert(name.to_string()) {
                    warn!(collection = %name, "sparse model missing or untrained, using dense-only search");
                }
                return Ok(None);
            }
        };

        let sparse = model.generate(
            query,
            GenerateOptions {
                max_terms: Some(QUERY_MAX_TERMS),
                min_score: None,
                normalize: true,
            },
        )?;
        Ok(Some(sparse))
    }
}

/// Each entry must look like `.rs`; one bad entry fails the whole call.
fn validate_extension_filter(entries: Option<&[String]>) -> Result<Option<Vec<String>>> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^\.[A-Za-z0-9_+-]+$").expect("static regex"));

    match entries {
        None => Ok(None),
        Some(entries) => {
            let mut normalized = Vec::with_capacity(entries.len());
            for entry in entries {
                if !pattern.is_match(entry) {
                    return Err(Error::InvalidExtensionFilter(entry.clone()));
                }
                normalized.push(entry.to_lowercase());
            }
            Ok(Some(normalized))
        }
    }
}

fn shape_result(hit: SearchHit) -> SearchResult {
    let language = serde_json::from_str::<serde_json::Value>(&hit.document.metadata)
        .ok()
        .and_then(|metadata| {
            metadata
                .get("language")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "text".to_string());

    SearchResult {
        content: hit.document.content,
        relative_path: hit.document.relative_path,
        start_line: hit.document.start_line.max(0) as usize,
        end_line: hit.document.end_line.max(0) as usize,
        language,
        score: hit.score,
    }
}
