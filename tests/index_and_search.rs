//! End-to-end indexing and hybrid search against the disk-backed store.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use codeseek::core::collection;
use codeseek::core::embed::NullEmbedder;
use codeseek::core::indexer::{IndexOptions, Indexer};
use codeseek::core::searcher::{SearchOptions, Searcher};
use codeseek::core::status::{CodebaseEntry, IndexedStatus};
use codeseek::core::store::{DiskVectorStore, VectorStore};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn python_auth_file() -> String {
    let body = "    session = lookup_session(password)\n".repeat(6);
    format!("def authenticate(password):\n{body}    return session is not None\n")
}

fn engine(store_dir: &TempDir) -> (Indexer, Searcher) {
    let embedder = Arc::new(NullEmbedder::default());
    let store: Arc<dyn VectorStore> = Arc::new(
        DiskVectorStore::open(store_dir.path().join("collections")).unwrap(),
    );
    let indexer = Indexer::new(embedder.clone(), store.clone(), store_dir.path().to_path_buf());
    let searcher = Searcher::new(
        embedder,
        store,
        indexer.registry().clone(),
        indexer.bm25_catalog().clone(),
    );
    (indexer, searcher)
}

#[tokio::test]
async fn index_then_hybrid_search() {
    let store_dir = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    write(root.path(), "auth.py", &python_auth_file());
    write(
        root.path(),
        "notes.md",
        "# Garden journal\n\nTomatoes ripen slowly in the shade.\n",
    );
    // A third file keeps the IDF of single-document terms positive, so
    // the sparse branch actually ranks the keyword match.
    write(
        root.path(),
        "util.py",
        "def format_bytes(n):\n    return str(n) + ' B'\n",
    );

    let (indexer, searcher) = engine(&store_dir);
    let stats = indexer
        .index_codebase(
            root.path(),
            IndexOptions::default(),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(stats.indexed_files, 3);
    assert_eq!(stats.status, IndexedStatus::Completed);

    let response = searcher
        .search(
            root.path(),
            "authenticate user password",
            SearchOptions {
                limit: 5,
                threshold: None,
                extension_filter: None,
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!response.indexing);
    assert!(!response.results.is_empty());
    assert_eq!(response.results[0].relative_path, "auth.py");
    assert_eq!(response.results[0].language, "python");
    assert!(response.results[0].score > 0.0);

    // A threshold between the fused scores keeps the keyword match and
    // drops the unrelated markdown chunk.
    let top_score = response.results[0].score;
    let md_score = response
        .results
        .iter()
        .find(|result| result.relative_path == "notes.md")
        .map(|result| result.score);
    if let Some(md_score) = md_score {
        assert!(top_score > md_score);
        let threshold = (top_score + md_score) / 2.0;
        let filtered = searcher
            .search(
                root.path(),
                "authenticate user password",
                SearchOptions {
                    limit: 5,
                    threshold: Some(threshold),
                    extension_filter: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(filtered
            .results
            .iter()
            .all(|result| result.relative_path != "notes.md"));
        assert!(filtered
            .results
            .iter()
            .any(|result| result.relative_path == "auth.py"));
    }
}

#[tokio::test]
async fn force_reindex_cycle() {
    let store_dir = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    write(root.path(), "auth.py", &python_auth_file());

    let (indexer, _searcher) = engine(&store_dir);
    indexer
        .index_codebase(
            root.path(),
            IndexOptions::default(),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let err = indexer
        .index_codebase(
            root.path(),
            IndexOptions::default(),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "already_indexed");

    let stats = indexer
        .index_codebase(
            root.path(),
            IndexOptions {
                force: true,
                ..Default::default()
            },
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(stats.status, IndexedStatus::Completed);

    match indexer.status(root.path()).unwrap() {
        CodebaseEntry::Indexed { status, .. } => assert_eq!(status, IndexedStatus::Completed),
        other => panic!("unexpected status {other:?}"),
    }
}

#[tokio::test]
async fn search_unindexed_root_fails() {
    let store_dir = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let (_indexer, searcher) = engine(&store_dir);

    let err = searcher
        .search(
            root.path(),
            "anything",
            SearchOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_indexed");
}

#[tokio::test]
async fn index_survives_process_restart() {
    let store_dir = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    write(root.path(), "auth.py", &python_auth_file());

    {
        let (indexer, _) = engine(&store_dir);
        indexer
            .index_codebase(
                root.path(),
                IndexOptions::default(),
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();
    }
    // Let the fire-and-forget registry write land before "restarting".
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let (indexer, searcher) = engine(&store_dir);
    assert!(indexer.status(root.path()).unwrap().is_indexed());

    let response = searcher
        .search(
            root.path(),
            "authenticate password",
            SearchOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(response.results[0].relative_path, "auth.py");
}

#[tokio::test]
async fn missing_sparse_model_degrades_to_dense_only() {
    let store_dir = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    write(root.path(), "auth.py", &python_auth_file());
    write(
        root.path(),
        "util.py",
        "def format_bytes(n):\n    return str(n) + ' B'\n",
    );

    let (indexer, searcher) = engine(&store_dir);
    indexer
        .index_codebase(
            root.path(),
            IndexOptions::default(),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // Drop the persisted sparse model out from under the searcher.
    let canonical = root.path().canonicalize().unwrap();
    let name = collection::collection_name(&canonical);
    let model_path = store_dir.path().join(format!("{name}.bm25.json"));
    assert!(model_path.exists(), "hybrid indexing persists the model");
    fs::remove_file(&model_path).unwrap();

    let response = searcher
        .search(
            root.path(),
            "authenticate password",
            SearchOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(
        !response.results.is_empty(),
        "dense-only fallback still returns results"
    );
}

#[tokio::test]
async fn clear_then_search_fails() {
    let store_dir = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    write(root.path(), "auth.py", &python_auth_file());

    let (indexer, searcher) = engine(&store_dir);
    indexer
        .index_codebase(
            root.path(),
            IndexOptions::default(),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let cleared = indexer.clear(root.path()).await.unwrap();
    assert!(cleared.cleared);
    assert_eq!(cleared.remaining_indexed_codebases, 0);

    let err = searcher
        .search(
            root.path(),
            "authenticate",
            SearchOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_indexed");
}
