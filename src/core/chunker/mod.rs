//! Syntax-aware chunking of source files.
//!
//! Two strategies, selected per invocation: `ast` (the default) parses the
//! file with a language grammar and cuts at top-level declarations with a
//! size-bounded recursive descent; `langchain` is a size/overlap character
//! splitter used as the fallback for unknown languages, grammar failures
//! and oversized leaves.

mod ast;
mod markdown;
mod splitter;

pub use splitter::TextSplitter;

use std::collections::HashSet;
use std::str::FromStr;
use tracing::warn;

use crate::core::error::Error;

/// Maximum characters per AST chunk before recursive splitting kicks in.
pub const MAX_CHUNK_CHARS: usize = 2500;
/// AST chunks below this merge greedily with small neighbours.
pub const MIN_CHUNK_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub language: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    /// Grammar node that produced the chunk, for observability only.
    pub node_kind: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Splitter {
    #[default]
    Ast,
    Langchain,
}

impl FromStr for Splitter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "ast" => Ok(Splitter::Ast),
            "langchain" => Ok(Splitter::Langchain),
            other => Err(Error::InvalidSplitter(other.to_string())),
        }
    }
}

impl Splitter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Splitter::Ast => "ast",
            Splitter::Langchain => "langchain",
        }
    }
}

pub struct Chunker {
    splitter: Splitter,
    ast: ast::AstChunker,
    fallback: TextSplitter,
    /// Languages we already warned about falling back for, once per run.
    warned_languages: HashSet<String>,
}

impl Chunker {
    pub fn new(splitter: Splitter) -> Self {
        Self {
            splitter,
            ast: ast::AstChunker::new(MAX_CHUNK_CHARS, MIN_CHUNK_CHARS),
            fallback: TextSplitter::default(),
            warned_languages: HashSet::new(),
        }
    }

    pub fn splitter(&self) -> Splitter {
        self.splitter
    }

    /// Chunk one file. `relative_path` drives language detection.
    pub fn chunk_file(&mut self, relative_path: &str, content: &str) -> Vec<Chunk> {
        let normalized = normalize_line_endings(content);
        if normalized.trim().is_empty() {
            return vec![];
        }

        let language = detect_language(relative_path).unwrap_or("text");

        let chunks = match self.splitter {
            Splitter::Langchain => self.fallback_chunks(&normalized, language),
            Splitter::Ast => match self.ast_chunks(&normalized, language) {
                Some(chunks) if !chunks.is_empty() => chunks,
                _ => {
                    if language != "text" && self.warned_languages.insert(language.to_string()) {
                        warn!(language, "no usable grammar, falling back to size-based chunking");
                    }
                    self.fallback_chunks(&normalized, language)
                }
            },
        };

        chunks
    }

    fn ast_chunks(&mut self, content: &str, language: &str) -> Option<Vec<Chunk>> {
        if language == "markdown" {
            return Some(markdown::chunk_markdown(
                content,
                self.ast.max_chunk_chars(),
                self.ast.min_chunk_chars(),
                &self.fallback,
            ));
        }
        self.ast.chunk(content, language, &self.fallback)
    }

    fn fallback_chunks(&self, content: &str, language: &str) -> Vec<Chunk> {
        let line_index = LineIndex::new(content);
        self.fallback
            .split(content)
            .into_iter()
            .filter(|range| !content[range.clone()].trim().is_empty())
            .map(|range| {
                let (start_line, end_line) = line_index.lines_of(range.start, range.end);
                Chunk {
                    content: content[range].to_string(),
                    language: language.to_string(),
                    start_line,
                    end_line,
                    node_kind: None,
                }
            })
            .collect()
    }
}

/// Line numbers must be stable across platforms.
pub fn normalize_line_endings(content: &str) -> String {
    if content.contains('\r') {
        content.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        content.to_string()
    }
}

/// Byte-offset to 1-based line number mapping.
pub(crate) struct LineIndex {
    /// Byte offset of the start of each line.
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(content: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in content.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    pub fn line_of(&self, byte_offset: usize) -> usize {
        match self.line_starts.binary_search(&byte_offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// Inclusive (start, end) lines for a half-open byte range.
    pub fn lines_of(&self, start: usize, end: usize) -> (usize, usize) {
        let start_line = self.line_of(start);
        let end_line = self.line_of(end.saturating_sub(1).max(start));
        (start_line, end_line.max(start_line))
    }
}

pub fn detect_language(relative_path: &str) -> Option<&'static str> {
    let ext = relative_path.rsplit('.').next()?;

    match ext.to_lowercase().as_str() {
        "rs" => Some("rust"),
        "py" | "pyw" => Some("python"),
        "js" | "mjs" | "cjs" | "jsx" => Some("javascript"),
        "ts" | "mts" | "cts" => Some("typescript"),
        "tsx" => Some("tsx"),
        "go" => Some("go"),
        "java" => Some("java"),
        "c" | "h" => Some("c"),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some("cpp"),
        "cs" => Some("csharp"),
        "php" => Some("php"),
        "rb" => Some("ruby"),
        "swift" => Some("swift"),
        "kt" | "kts" => Some("kotlin"),
        "scala" | "sc" => Some("scala"),
        "md" | "markdown" => Some("markdown"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splitter_parses_from_str() {
        assert_eq!(Splitter::from_str("ast").unwrap(), Splitter::Ast);
        assert_eq!(Splitter::from_str("langchain").unwrap(), Splitter::Langchain);
        assert_eq!(
            Splitter::from_str("semantic").unwrap_err().kind(),
            "invalid_splitter"
        );
    }

    #[test]
    fn crlf_is_normalized() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\n"), "a\nb\nc\n");
    }

    #[test]
    fn line_index_maps_offsets() {
        let idx = LineIndex::new("ab\ncd\nef");
        assert_eq!(idx.line_of(0), 1);
        assert_eq!(idx.line_of(3), 2);
        assert_eq!(idx.line_of(6), 3);
        assert_eq!(idx.lines_of(0, 5), (1, 2));
    }

    #[test]
    fn detects_languages_from_extension() {
        assert_eq!(detect_language("src/main.rs"), Some("rust"));
        assert_eq!(detect_language("app.py"), Some("python"));
        assert_eq!(detect_language("README.md"), Some("markdown"));
        assert_eq!(detect_language("Makefile"), None);
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let mut chunker = Chunker::new(Splitter::Ast);
        assert!(chunker.chunk_file("a.rs", "   \n  ").is_empty());
    }

    #[test]
    fn scala_falls_back_to_size_based() {
        let mut chunker = Chunker::new(Splitter::Ast);
        let chunks = chunker.chunk_file("a.scala", "object Main {\n  def main(): Unit = ()\n}\n");
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.node_kind.is_none()));
    }

    #[test]
    fn langchain_strategy_ignores_grammar() {
        let mut chunker = Chunker::new(Splitter::Langchain);
        let chunks = chunker.chunk_file("a.rs", "fn main() {\n    println!(\"hi\");\n}\n");
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.node_kind.is_none()));
        assert_eq!(chunks[0].language, "rust");
    }
}
