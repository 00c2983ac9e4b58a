//! Indexing orchestration.
//!
//! Drives walker, chunker, embedder, sparse model and vector store for
//! full and incremental runs. One run is a bounded pipeline: at most two
//! embedding batches in flight, inserts serialised, progress monotonic.
//! Lifecycle state lives in the StatusRegistry; snapshots make the next
//! `reindex_by_change` incremental.

use futures::stream::{FuturesOrdered, StreamExt};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::bm25::{Bm25Catalog, Bm25Model, GenerateOptions};
use crate::core::chunker::{Chunk, Chunker, Splitter};
use crate::core::collection;
use crate::core::embed::retry::RetryPolicy;
use crate::core::embed::EmbeddingClient;
use crate::core::error::{Error, Result};
use crate::core::snapshot::{hash_file_bytes, ChangeDetector, SnapshotStore};
use crate::core::status::{CodebaseEntry, IndexedStatus, StatusRegistry};
use crate::core::store::{document_id, VectorDocument, VectorStore};
use crate::core::walker::{FileWalker, WalkedFile};

/// Chunks per embedding request.
pub const EMBED_BATCH: usize = 64;
/// Documents per store insert.
pub const INSERT_BATCH: usize = 128;
/// Embedding batches in flight at once.
const MAX_INFLIGHT_EMBED: usize = 2;
/// Pause between per-item fallback embeddings.
const ITEM_FALLBACK_DELAY: Duration = Duration::from_millis(100);
/// Scroll page used when collecting ids or corpus text.
const SCROLL_LIMIT: usize = 1_000_000;

#[derive(Debug, Clone)]
pub struct Progress {
    pub phase: &'static str,
    pub processed: usize,
    pub total: usize,
    pub percentage: f32,
}

pub type ProgressCallback = Box<dyn Fn(Progress) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub force: bool,
    pub splitter: Splitter,
    pub allowed_extensions: Option<Vec<String>>,
    pub ignore_patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct IndexStats {
    pub indexed_files: u64,
    pub total_chunks: u64,
    pub status: IndexedStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReindexStats {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
}

#[derive(Debug, Clone)]
pub struct ClearStats {
    pub cleared: bool,
    pub remaining_indexed_codebases: usize,
}

/// Monotonic progress reporting for one run.
struct ProgressTracker<'a> {
    callback: Option<&'a ProgressCallback>,
    last_percentage: Mutex<f32>,
}

impl<'a> ProgressTracker<'a> {
    fn new(callback: Option<&'a ProgressCallback>) -> Self {
        Self {
            callback,
            last_percentage: Mutex::new(0.0),
        }
    }

    fn emit(&self, phase: &'static str, processed: usize, total: usize) {
        let raw = if total == 0 {
            100.0
        } else {
            100.0 * processed as f32 / total as f32
        };
        let percentage = {
            let mut last = self.last_percentage.lock().unwrap_or_else(|e| e.into_inner());
            *last = last.max(raw.clamp(0.0, 100.0));
            *last
        };
        if let Some(callback) = self.callback {
            callback(Progress {
                phase,
                processed,
                total,
                percentage,
            });
        }
    }

    fn last(&self) -> f32 {
        *self.last_percentage.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One chunked file ready for the embed/insert pipeline.
struct FileChunks {
    relative: String,
    hash: String,
    chunks: Vec<Chunk>,
}

struct PendingChunk {
    file_index: usize,
    relative_path: String,
    file_extension: String,
    content: String,
    start_line: usize,
    end_line: usize,
    language: String,
    node_kind: Option<String>,
}

struct PipelineOutcome {
    inserted_chunks: u64,
    /// (relative path, file hash) of files whose chunks all made it in.
    complete_files: Vec<(String, String)>,
    limit_reached: bool,
}

pub struct Indexer {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    snapshots: SnapshotStore,
    bm25_catalog: Bm25Catalog,
    registry: StatusRegistry,
    retry: RetryPolicy,
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        store_dir: PathBuf,
    ) -> Self {
        // CPU-bound work (hashing, chunking) rides a bounded rayon pool.
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(8);
        rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build_global()
            .ok();

        Self {
            embedder,
            store,
            snapshots: SnapshotStore::new(store_dir.clone()),
            bm25_catalog: Bm25Catalog::new(store_dir.clone()),
            registry: StatusRegistry::open(store_dir.join("registry.json")),
            retry: RetryPolicy::default(),
        }
    }

    pub fn registry(&self) -> &StatusRegistry {
        &self.registry
    }

    pub fn bm25_catalog(&self) -> &Bm25Catalog {
        &self.bm25_catalog
    }

    /// Full index of `root`. Fails with `AlreadyIndexed` when a collection
    /// exists and `force` is false.
    pub async fn index_codebase(
        &self,
        root: &Path,
        options: IndexOptions,
        progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Result<IndexStats> {
        let canonical = collection::canonical_root(root)?;
        let root_key = canonical.to_string_lossy().to_string();
        let name = collection::collection_name(&canonical);

        if matches!(self.registry.get(&root_key), Some(entry) if entry.is_indexing()) {
            return Err(Error::AlreadyIndexing(root_key));
        }
        if self.store.has_collection(&name).await? {
            if !options.force {
                return Err(Error::AlreadyIndexed(root_key));
            }
            info!(collection = %name, "force re-index: dropping existing collection");
            self.store.drop_collection(&name).await?;
            self.bm25_catalog.delete(&name)?;
        }

        self.registry.set_indexing(&root_key, 0.0);
        let tracker = ProgressTracker::new(progress.as_ref());

        match self
            .run_full_index(&canonical, &name, &options, &tracker, &cancel)
            .await
        {
            Ok(stats) => {
                self.registry.set_indexed(
                    &root_key,
                    stats.indexed_files,
                    stats.total_chunks,
                    stats.status,
                );
                Ok(stats)
            }
            Err(err) => {
                self.registry
                    .set_failed(&root_key, err.to_string(), tracker.last());
                Err(err)
            }
        }
    }

    async fn run_full_index(
        &self,
        canonical: &Path,
        name: &str,
        options: &IndexOptions,
        tracker: &ProgressTracker<'_>,
        cancel: &CancellationToken,
    ) -> Result<IndexStats> {
        let walker = FileWalker::new(
            canonical,
            options.allowed_extensions.as_deref(),
            options.ignore_patterns.as_deref(),
        )?;
        let files = walker.walk();
        debug!(collection = %name, files = files.len(), "scanned codebase");

        let chunked = chunk_files(&files, options.splitter, cancel);
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let dimension = self.embedder.dimension().await?;
        let hybrid = match self.store.create_hybrid_collection(name, dimension).await {
            Ok(()) => true,
            Err(Error::Store(reason)) => {
                debug!(collection = %name, %reason, "hybrid collection unavailable, creating dense-only");
                self.store.create_collection(name, dimension).await?;
                false
            }
            Err(err) => return Err(err),
        };

        let total_chunks: usize = chunked.iter().map(|file| file.chunks.len()).sum();
        let outcome = self
            .embed_and_insert(
                name,
                hybrid,
                &chunked,
                Vec::new(),
                cancel,
                |chunks_done, _files_done| {
                    tracker.emit("indexing", chunks_done, total_chunks);
                },
            )
            .await?;

        // Snapshot covers every file that was fully processed, including
        // ones that produced no chunks.
        let mut snapshot: HashMap<String, String> = outcome
            .complete_files
            .iter()
            .cloned()
            .collect();
        if !outcome.limit_reached {
            for file in chunked.iter().filter(|file| file.chunks.is_empty()) {
                snapshot.insert(file.relative.clone(), file.hash.clone());
            }
        }
        self.snapshots.save(canonical, &snapshot)?;

        let indexed_files = outcome
            .complete_files
            .len() as u64;
        let status = if outcome.limit_reached {
            warn!(collection = %name, "store reported collection limit, stopping cleanly");
            IndexedStatus::LimitReached
        } else {
            IndexedStatus::Completed
        };

        Ok(IndexStats {
            indexed_files,
            total_chunks: outcome.inserted_chunks,
            status,
        })
    }

    /// Incremental pass: diff the tree against the stored snapshot, then
    /// delete, re-chunk and insert only what changed.
    pub async fn reindex_by_change(
        &self,
        root: &Path,
        progress: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> Result<ReindexStats> {
        let canonical = collection::canonical_root(root)?;
        let root_key = canonical.to_string_lossy().to_string();
        let name = collection::collection_name(&canonical);

        if !self.store.has_collection(&name).await? {
            return Err(Error::NotIndexed(root_key));
        }
        if matches!(self.registry.get(&root_key), Some(entry) if entry.is_indexing()) {
            return Err(Error::AlreadyIndexing(root_key));
        }

        let prior = self.snapshots.load(&canonical)?;
        let changes = ChangeDetector::diff(&canonical, None, None, &prior)?;
        let stats = ReindexStats {
            added: changes.added.len(),
            modified: changes.modified.len(),
            removed: changes.removed.len(),
        };
        if changes.is_empty() {
            return Ok(stats);
        }

        self.registry.set_indexing(&root_key, 0.0);
        let tracker = ProgressTracker::new(progress.as_ref());
        let total = changes.total();

        let result = self
            .run_reindex(&canonical, &name, &changes, &tracker, &cancel, total)
            .await;

        match result {
            Ok(()) => {
                let doc_count = self.collection_doc_count(&name).await?;
                self.registry.set_indexed(
                    &root_key,
                    changes.new_snapshot.len() as u64,
                    doc_count,
                    IndexedStatus::Completed,
                );
                Ok(stats)
            }
            Err(err) => {
                self.registry
                    .set_failed(&root_key, err.to_string(), tracker.last());
                Err(err)
            }
        }
    }

    async fn run_reindex(
        &self,
        canonical: &Path,
        name: &str,
        changes: &crate::core::snapshot::ChangeSet,
        tracker: &ProgressTracker<'_>,
        cancel: &CancellationToken,
        total: usize,
    ) -> Result<()> {
        let mut handled = 0usize;

        for path in &changes.removed {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.delete_file_documents(name, path).await?;
            handled += 1;
            tracker.emit("reindexing", handled, total);
        }
        for path in &changes.modified {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            // Modified files re-enter the pipeline below; drop their old
            // vectors first.
            self.delete_file_documents(name, path).await?;
        }

        let to_index: Vec<WalkedFile> = changes
            .modified
            .iter()
            .chain(changes.added.iter())
            .map(|relative| WalkedFile {
                absolute: canonical.join(relative),
                relative: relative.clone(),
            })
            .collect();

        if !to_index.is_empty() {
            let chunked = chunk_files(&to_index, Splitter::Ast, cancel);
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let hybrid = self.store.is_hybrid(name).await?;
            // The sparse model retrains over the whole corpus, so seed it
            // with the content already in the collection.
            let corpus_seed = if hybrid {
                self.store
                    .query(name, "", SCROLL_LIMIT)
                    .await?
                    .into_iter()
                    .map(|document| document.content)
                    .collect()
            } else {
                Vec::new()
            };

            let removed_and_modified = handled;
            self.embed_and_insert(name, hybrid, &chunked, corpus_seed, cancel, |_chunks, files_done| {
                tracker.emit("reindexing", removed_and_modified + files_done, total);
            })
            .await?;
        }

        self.snapshots.save(canonical, &changes.new_snapshot)?;
        tracker.emit("reindexing", total, total);
        Ok(())
    }

    /// Drop collection, snapshot and registry entry. Missing pieces are
    /// not errors.
    pub async fn clear(&self, root: &Path) -> Result<ClearStats> {
        let canonical = collection::canonical_root(root)?;
        let root_key = canonical.to_string_lossy().to_string();
        let name = collection::collection_name(&canonical);

        let existed = self.store.has_collection(&name).await?;
        if existed {
            self.store.drop_collection(&name).await?;
        }
        self.bm25_catalog.delete(&name)?;
        self.snapshots.delete(&canonical)?;
        self.registry.remove(&root_key);

        Ok(ClearStats {
            cleared: existed,
            remaining_indexed_codebases: self.registry.indexed_count(),
        })
    }

    /// Pure registry read.
    pub fn status(&self, root: &Path) -> Option<CodebaseEntry> {
        let canonical = root.canonicalize().ok()?;
        self.registry.get(&canonical.to_string_lossy())
    }

    async fn collection_doc_count(&self, name: &str) -> Result<u64> {
        match self.store.query(name, "", SCROLL_LIMIT).await {
            Ok(documents) => Ok(documents.len() as u64),
            Err(Error::UnsupportedFilter(_)) => Ok(0),
            Err(err) => Err(err),
        }
    }

    async fn delete_file_documents(&self, name: &str, relative_path: &str) -> Result<()> {
        let filter = format!("relativePath == '{relative_path}'");
        let documents = match self.store.query(name, &filter, SCROLL_LIMIT).await {
            Ok(documents) => documents,
            Err(Error::UnsupportedFilter(_)) => {
                // Filterless scroll, then match client-side.
                self.store
                    .query(name, "", SCROLL_LIMIT)
                    .await?
                    .into_iter()
                    .filter(|document| document.relative_path == relative_path)
                    .collect()
            }
            Err(err) => return Err(err),
        };

        if documents.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = documents.into_iter().map(|document| document.id).collect();
        match self.store.delete(name, &ids).await {
            Ok(()) => Ok(()),
            Err(err @ Error::UnsupportedDeletion(_)) => {
                warn!(
                    collection = %name,
                    path = relative_path,
                    "backend cannot delete; a full re-index (force) is required"
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Embed chunks (bounded fan-out) and insert them in batches.
    /// `report(chunks_done, files_done)` fires after every inserted batch.
    async fn embed_and_insert(
        &self,
        name: &str,
        hybrid: bool,
        files: &[FileChunks],
        corpus_seed: Vec<String>,
        cancel: &CancellationToken,
        report: impl Fn(usize, usize),
    ) -> Result<PipelineOutcome> {
        let mut queue: std::collections::VecDeque<PendingChunk> = std::collections::VecDeque::new();
        // Per file: total chunks, chunks inserted, chunks skipped.
        let total_per_file: Vec<usize> = files.iter().map(|file| file.chunks.len()).collect();
        let mut inserted_per_file = vec![0usize; files.len()];
        let mut skipped_per_file = vec![0usize; files.len()];

        for (file_index, file) in files.iter().enumerate() {
            let extension = extension_of(&file.relative);
            for chunk in &file.chunks {
                queue.push_back(PendingChunk {
                    file_index,
                    relative_path: file.relative.clone(),
                    file_extension: extension.clone(),
                    content: chunk.content.clone(),
                    start_line: chunk.start_line,
                    end_line: chunk.end_line,
                    language: chunk.language.clone(),
                    node_kind: chunk.node_kind.clone(),
                });
            }
        }

        let mut bm25 = Bm25Model::new();
        let mut corpus = corpus_seed;
        // Staged documents keep their file index until the insert lands.
        let mut staged: Vec<(usize, VectorDocument)> = Vec::new();
        let mut inflight = FuturesOrdered::new();

        let mut inserted_chunks = 0u64;
        let mut files_done = 0usize;
        let mut chunks_done = 0usize;
        let mut limit_reached = false;
        let mut complete_files: Vec<(String, String)> = Vec::new();

        let mark_progress =
            |file_index: usize,
             inserted_per_file: &[usize],
             skipped_per_file: &[usize],
             files_done: &mut usize,
             complete_files: &mut Vec<(String, String)>| {
                if total_per_file[file_index] > 0
                    && inserted_per_file[file_index] + skipped_per_file[file_index]
                        == total_per_file[file_index]
                {
                    *files_done += 1;
                    complete_files.push((
                        files[file_index].relative.clone(),
                        files[file_index].hash.clone(),
                    ));
                }
            };

        'pipeline: loop {
            if cancel.is_cancelled() {
                // Stop scheduling; drain what is already in flight.
                while inflight.next().await.is_some() {}
                return Err(Error::Cancelled);
            }

            while inflight.len() < MAX_INFLIGHT_EMBED && !queue.is_empty() {
                let take = queue.len().min(EMBED_BATCH);
                let batch: Vec<PendingChunk> = queue.drain(..take).collect();
                let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
                inflight.push_back(async move {
                    let embeddings = self.embed_with_fallback(texts).await;
                    (batch, embeddings)
                });
            }

            let Some((batch, embeddings)) = inflight.next().await else {
                break 'pipeline;
            };

            for (chunk, embedding) in batch.into_iter().zip(embeddings) {
                chunks_done += 1;
                let file_index = chunk.file_index;
                match embedding {
                    Some(dense) => staged.push((file_index, make_document(chunk, dense))),
                    None => {
                        warn!(path = %chunk.relative_path, start_line = chunk.start_line, "skipping chunk after embedding failure");
                        skipped_per_file[file_index] += 1;
                        mark_progress(
                            file_index,
                            &inserted_per_file,
                            &skipped_per_file,
                            &mut files_done,
                            &mut complete_files,
                        );
                    }
                }
            }

            while staged.len() >= INSERT_BATCH {
                if !self.store.check_collection_limit(name).await? {
                    limit_reached = true;
                    break 'pipeline;
                }
                let batch: Vec<(usize, VectorDocument)> = staged.drain(..INSERT_BATCH).collect();
                inserted_chunks += batch.len() as u64;
                let file_indices: Vec<usize> = batch.iter().map(|(index, _)| *index).collect();
                let documents: Vec<VectorDocument> =
                    batch.into_iter().map(|(_, document)| document).collect();
                self.insert_batch(name, hybrid, documents, &mut corpus, &mut bm25)
                    .await?;
                for file_index in file_indices {
                    inserted_per_file[file_index] += 1;
                    mark_progress(
                        file_index,
                        &inserted_per_file,
                        &skipped_per_file,
                        &mut files_done,
                        &mut complete_files,
                    );
                }
                report(chunks_done, files_done);
            }
        }

        if !limit_reached && !staged.is_empty() {
            if self.store.check_collection_limit(name).await? {
                let batch: Vec<(usize, VectorDocument)> = staged.drain(..).collect();
                inserted_chunks += batch.len() as u64;
                let file_indices: Vec<usize> = batch.iter().map(|(index, _)| *index).collect();
                let documents: Vec<VectorDocument> =
                    batch.into_iter().map(|(_, document)| document).collect();
                self.insert_batch(name, hybrid, documents, &mut corpus, &mut bm25)
                    .await?;
                for file_index in file_indices {
                    inserted_per_file[file_index] += 1;
                    mark_progress(
                        file_index,
                        &inserted_per_file,
                        &skipped_per_file,
                        &mut files_done,
                        &mut complete_files,
                    );
                }
                report(chunks_done, files_done);
            } else {
                limit_reached = true;
            }
        }

        if hybrid && bm25.is_trained() {
            self.bm25_catalog.save(name, &bm25)?;
        }

        Ok(PipelineOutcome {
            inserted_chunks,
            complete_files,
            limit_reached,
        })
    }

    async fn insert_batch(
        &self,
        name: &str,
        hybrid: bool,
        mut batch: Vec<VectorDocument>,
        corpus: &mut Vec<String>,
        bm25: &mut Bm25Model,
    ) -> Result<()> {
        if hybrid {
            // Keep IDF consistent with the growing corpus: re-learn over
            // everything collected so far before every hybrid insert.
            corpus.extend(batch.iter().map(|document| document.content.clone()));
            bm25.learn(corpus.iter())?;
            for document in &mut batch {
                document.sparse_vector =
                    Some(bm25.generate(&document.content, GenerateOptions::default())?);
            }
            self.store.insert_hybrid(name, batch).await
        } else {
            self.store.insert(name, batch).await
        }
    }

    /// Batch embedding with retry; exhausted retries degrade to per-item
    /// calls, and a failed item is skipped (`None`).
    async fn embed_with_fallback(&self, texts: Vec<String>) -> Vec<Option<Vec<f32>>> {
        let batch_result = self
            .retry
            .run("embed_batch", || {
                let texts = texts.clone();
                async move { self.embedder.embed_batch(&texts).await }
            })
            .await;

        match batch_result {
            Ok(vectors) => vectors.into_iter().map(Some).collect(),
            Err(batch_err) => {
                warn!(error = %batch_err, batch = texts.len(), "batch embedding failed, falling back to per-item");
                let mut out = Vec::with_capacity(texts.len());
                for (i, text) in texts.iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(ITEM_FALLBACK_DELAY).await;
                    }
                    let item = self
                        .retry
                        .run("embed", || {
                            let text = text.clone();
                            async move { self.embedder.embed(&text).await }
                        })
                        .await;
                    match item {
                        Ok(vector) => out.push(Some(vector)),
                        Err(err) => {
                            warn!(error = %err, "per-item embedding failed");
                            out.push(None);
                        }
                    }
                }
                out
            }
        }
    }
}

fn extension_of(relative_path: &str) -> String {
    Path::new(relative_path)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn make_document(chunk: PendingChunk, dense: Vec<f32>) -> VectorDocument {
    let content_hash = hash_file_bytes(chunk.content.as_bytes());
    let metadata = serde_json::json!({
        "language": chunk.language,
        "nodeKind": chunk.node_kind,
    })
    .to_string();

    VectorDocument {
        id: document_id(
            &chunk.relative_path,
            chunk.start_line,
            chunk.end_line,
            &content_hash,
        ),
        dense_vector: dense,
        sparse_vector: None,
        content: chunk.content,
        relative_path: chunk.relative_path,
        start_line: chunk.start_line as i64,
        end_line: chunk.end_line as i64,
        file_extension: chunk.file_extension,
        metadata,
    }
}

/// Read, hash and chunk files on the rayon pool. Unreadable files are
/// skipped with a warning.
fn chunk_files(files: &[WalkedFile], splitter: Splitter, cancel: &CancellationToken) -> Vec<FileChunks> {
    use rayon::prelude::*;

    files
        .par_iter()
        .map_init(
            || Chunker::new(splitter),
            |chunker, file| {
                if cancel.is_cancelled() {
                    return None;
                }
                let bytes = match fs::read(&file.absolute) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(path = %file.relative, error = %e, "skipping unreadable file");
                        return None;
                    }
                };
                let hash = hash_file_bytes(&bytes);
                let content = String::from_utf8_lossy(&bytes);
                let chunks = chunker.chunk_file(&file.relative, &content);
                Some(FileChunks {
                    relative: file.relative.clone(),
                    hash,
                    chunks,
                })
            },
        )
        .filter_map(|file| file)
        .collect()
}
