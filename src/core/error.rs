//! Error taxonomy for the engine.
//!
//! Every public operation returns either a payload or an `Error` carrying a
//! stable machine-readable kind plus a human message naming the offending
//! path or collection.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("path not found or not a directory: {0}")]
    PathNotFound(PathBuf),

    #[error("codebase already indexed: {0} (pass force=true to re-index)")]
    AlreadyIndexed(String),

    #[error("codebase is currently being indexed: {0}")]
    AlreadyIndexing(String),

    #[error("codebase not indexed: {0}")]
    NotIndexed(String),

    #[error("BM25 corpus is empty")]
    EmptyCorpus,

    #[error("BM25 model used before training")]
    NotTrained,

    #[error("invalid splitter: {0} (expected \"ast\" or \"langchain\")")]
    InvalidSplitter(String),

    #[error("invalid extension filter entry: {0} (must match ^\\.[A-Za-z0-9_+-]+$)")]
    InvalidExtensionFilter(String),

    #[error("embedding provider error: {message}")]
    Embedding { message: String, retryable: bool },

    #[error("vector store error: {0}")]
    Store(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("collection limit reached for {0}")]
    CollectionLimitReached(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("store cannot evaluate filter: {0} (fall back to listing documents)")]
    UnsupportedFilter(String),

    #[error("store does not support deletion: {0} (drop and recreate the collection to remove documents)")]
    UnsupportedDeletion(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine-readable kind for the tool/CLI surface.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::PathNotFound(_) => "path_not_found",
            Error::AlreadyIndexed(_) => "already_indexed",
            Error::AlreadyIndexing(_) => "already_indexing",
            Error::NotIndexed(_) => "not_indexed",
            Error::EmptyCorpus => "empty_corpus",
            Error::NotTrained => "not_trained",
            Error::InvalidSplitter(_) => "invalid_splitter",
            Error::InvalidExtensionFilter(_) => "invalid_extension_filter",
            Error::Embedding { .. } => "embedding_error",
            Error::Store(_) => "store_error",
            Error::CollectionNotFound(_) => "collection_not_found",
            Error::CollectionLimitReached(_) => "collection_limit_reached",
            Error::Cancelled => "cancelled",
            Error::UnsupportedFilter(_) => "unsupported_filter",
            Error::UnsupportedDeletion(_) => "unsupported_deletion",
            Error::Snapshot(_) => "snapshot_error",
            Error::Config(_) => "config_error",
            Error::Io(_) => "io_error",
            Error::Json(_) => "serialization_error",
        }
    }

    /// Whether a retry at the same layer could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Embedding { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(Error::EmptyCorpus.kind(), "empty_corpus");
        assert_eq!(Error::NotTrained.kind(), "not_trained");
        assert_eq!(
            Error::InvalidSplitter("foo".into()).kind(),
            "invalid_splitter"
        );
    }

    #[test]
    fn retryable_flag_only_on_embedding() {
        let retryable = Error::Embedding {
            message: "429".into(),
            retryable: true,
        };
        let fatal = Error::Embedding {
            message: "401".into(),
            retryable: false,
        };
        assert!(retryable.is_retryable());
        assert!(!fatal.is_retryable());
        assert!(!Error::EmptyCorpus.is_retryable());
    }
}
