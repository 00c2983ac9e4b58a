//! File enumeration with include/ignore rules.
//!
//! Walks a codebase root depth-first in lexicographic order and yields
//! `(absolute, relative)` path pairs for files that pass the extension
//! allow-list, the ignore patterns and the size cap. Ignore patterns are
//! gitignore-style (`**` deep, `*` within a segment, trailing `/` for
//! directories); caller patterns are appended to the defaults, never
//! replacing them.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::error::{Error, Result};

/// Files larger than this are skipped with a warning.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Extensions indexed when the caller does not pass an allow-list.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "py", "java", "c", "cpp", "h", "hpp", "cc", "cxx", "cs", "go", "rs",
    "php", "rb", "swift", "kt", "scala", "md",
];

/// Always-on ignore patterns: build outputs, VCS state, lockfiles,
/// binary blobs and package caches.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git/",
    ".svn/",
    ".hg/",
    "node_modules/",
    "target/",
    "dist/",
    "build/",
    "out/",
    "vendor/",
    "__pycache__/",
    ".venv/",
    "venv/",
    ".idea/",
    ".vscode/",
    "coverage/",
    "*.lock",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "*.min.js",
    "*.map",
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.ico",
    "*.pdf",
    "*.zip",
    "*.tar",
    "*.gz",
    "*.so",
    "*.dylib",
    "*.dll",
    "*.a",
    "*.o",
    "*.class",
    "*.jar",
    "*.wasm",
];

#[derive(Debug, Clone)]
pub struct WalkedFile {
    pub absolute: PathBuf,
    /// Forward-slash normalised path relative to the walk root.
    pub relative: String,
}

pub struct FileWalker {
    root: PathBuf,
    extensions: HashSet<String>,
    ignore: Gitignore,
    max_file_size: u64,
}

impl FileWalker {
    pub fn new(
        root: &Path,
        allowed_extensions: Option<&[String]>,
        extra_ignore_patterns: Option<&[String]>,
    ) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::PathNotFound(root.to_path_buf()));
        }
        let root = root
            .canonicalize()
            .map_err(|_| Error::PathNotFound(root.to_path_buf()))?;

        let extensions: HashSet<String> = match allowed_extensions {
            Some(exts) if !exts.is_empty() => exts
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            _ => DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        };

        let mut builder = GitignoreBuilder::new(&root);
        for pattern in DEFAULT_IGNORE_PATTERNS {
            builder
                .add_line(None, pattern)
                .map_err(|e| Error::Config(format!("bad default ignore pattern: {}", e)))?;
        }
        if let Some(patterns) = extra_ignore_patterns {
            for pattern in patterns {
                builder
                    .add_line(None, pattern)
                    .map_err(|e| Error::Config(format!("bad ignore pattern {:?}: {}", pattern, e)))?;
            }
        }
        let ignore = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build ignore matcher: {}", e)))?;

        Ok(Self {
            root,
            extensions,
            ignore,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        })
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate matching files, depth-first, lexicographic per directory.
    pub fn walk(&self) -> Vec<WalkedFile> {
        let mut files = Vec::new();
        let mut seen_real_paths: HashSet<PathBuf> = HashSet::new();

        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .parents(false)
            .follow_links(true)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };

            let path = entry.path();
            let Some(relative) = self.relative_of(path) else {
                continue;
            };

            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            // Parent matching makes "node_modules/" drop everything below it.
            if self
                .ignore
                .matched_path_or_any_parents(&relative, is_dir)
                .is_ignore()
            {
                continue;
            }
            if is_dir || !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            // Follow symlinks once; a second sighting of the same real file
            // means a cycle or an alias, either way skip it.
            if entry.path_is_symlink() {
                match path.canonicalize() {
                    Ok(real) => {
                        if !seen_real_paths.insert(real) {
                            continue;
                        }
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping broken symlink");
                        continue;
                    }
                }
            }

            let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
                continue;
            };
            if !self.extensions.contains(&ext) {
                continue;
            }

            match entry.metadata() {
                Ok(meta) if meta.len() > self.max_file_size => {
                    warn!(
                        path = %relative,
                        size = meta.len(),
                        cap = self.max_file_size,
                        "skipping oversized file"
                    );
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %relative, error = %e, "skipping unreadable file");
                    continue;
                }
            }

            files.push(WalkedFile {
                absolute: path.to_path_buf(),
                relative,
            });
        }

        files
    }

    fn relative_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        if rel.as_os_str().is_empty() {
            return None;
        }
        let mut out = String::new();
        for component in rel.components() {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&component.as_os_str().to_string_lossy());
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn walks_in_sorted_order_with_relative_paths() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.rs", "fn b() {}");
        write(dir.path(), "a.rs", "fn a() {}");
        write(dir.path(), "sub/c.py", "def c(): pass");

        let walker = FileWalker::new(dir.path(), None, None).unwrap();
        let files = walker.walk();
        let rels: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(rels, vec!["a.rs", "b.rs", "sub/c.py"]);
    }

    #[test]
    fn default_ignores_apply_and_caller_patterns_append() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/main.rs", "fn main() {}");
        write(dir.path(), "node_modules/x/index.js", "x");
        write(dir.path(), "generated/schema.rs", "pub struct S;");

        let patterns = vec!["generated/".to_string()];
        let walker = FileWalker::new(dir.path(), None, Some(&patterns)).unwrap();
        let rels: Vec<String> = walker.walk().into_iter().map(|f| f.relative).collect();
        assert_eq!(rels, vec!["src/main.rs"]);
    }

    #[test]
    fn disallowed_extensions_are_skipped_silently() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.rs", "fn a() {}");
        write(dir.path(), "a.bin", "xx");

        let exts = vec!["rs".to_string()];
        let walker = FileWalker::new(dir.path(), Some(&exts), None).unwrap();
        let rels: Vec<String> = walker.walk().into_iter().map(|f| f.relative).collect();
        assert_eq!(rels, vec!["a.rs"]);
    }

    #[test]
    fn oversized_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "big.rs", &"x".repeat(200));
        write(dir.path(), "small.rs", "fn s() {}");

        let walker = FileWalker::new(dir.path(), None, None)
            .unwrap()
            .with_max_file_size(100);
        let rels: Vec<String> = walker.walk().into_iter().map(|f| f.relative).collect();
        assert_eq!(rels, vec!["small.rs"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = FileWalker::new(Path::new("/nonexistent/codeseek-test"), None, None)
            .err()
            .unwrap();
        assert_eq!(err.kind(), "path_not_found");
    }

    #[test]
    fn dotted_extension_filters_are_normalised() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.TS", "const a = 1;");

        let exts = vec![".ts".to_string()];
        let walker = FileWalker::new(dir.path(), Some(&exts), None).unwrap();
        assert_eq!(walker.walk().len(), 1);
    }
}
