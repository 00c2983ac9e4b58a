//! Tree-sitter backed chunking.
//!
//! Chunk boundaries are the top-level declarations each grammar marks as
//! splittable. Text between declarations (imports, module statements,
//! comments) is grouped into synthetic `module` chunks so that the chunk
//! sequence covers the whole file. Oversized nodes are split at the next
//! grammatical level; oversized leaves fall back to the size-based
//! splitter.

use std::collections::HashMap;
use std::ops::Range;
use tree_sitter::{Language, Node, Parser};

use super::splitter::TextSplitter;
use super::{Chunk, LineIndex};

struct LanguageConfig {
    language: Language,
    /// Node kinds that become chunk boundaries at the top level.
    splittable: &'static [&'static str],
}

fn language_config(language: &str) -> Option<LanguageConfig> {
    match language {
        "rust" => Some(LanguageConfig {
            language: tree_sitter_rust::LANGUAGE.into(),
            splittable: &[
                "function_item",
                "struct_item",
                "enum_item",
                "union_item",
                "trait_item",
                "impl_item",
                "mod_item",
                "type_item",
                "macro_definition",
            ],
        }),
        "python" => Some(LanguageConfig {
            language: tree_sitter_python::LANGUAGE.into(),
            splittable: &[
                "function_definition",
                "class_definition",
                "decorated_definition",
            ],
        }),
        "javascript" => Some(LanguageConfig {
            language: tree_sitter_javascript::LANGUAGE.into(),
            splittable: &[
                "function_declaration",
                "generator_function_declaration",
                "class_declaration",
                "method_definition",
                "lexical_declaration",
                "export_statement",
            ],
        }),
        "typescript" => Some(LanguageConfig {
            language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            splittable: &[
                "function_declaration",
                "generator_function_declaration",
                "class_declaration",
                "abstract_class_declaration",
                "interface_declaration",
                "enum_declaration",
                "type_alias_declaration",
                "method_definition",
                "lexical_declaration",
                "export_statement",
                "internal_module",
            ],
        }),
        "tsx" => Some(LanguageConfig {
            language: tree_sitter_typescript::LANGUAGE_TSX.into(),
            splittable: &[
                "function_declaration",
                "generator_function_declaration",
                "class_declaration",
                "abstract_class_declaration",
                "interface_declaration",
                "enum_declaration",
                "type_alias_declaration",
                "method_definition",
                "lexical_declaration",
                "export_statement",
            ],
        }),
        "go" => Some(LanguageConfig {
            language: tree_sitter_go::LANGUAGE.into(),
            splittable: &[
                "function_declaration",
                "method_declaration",
                "type_declaration",
            ],
        }),
        "java" => Some(LanguageConfig {
            language: tree_sitter_java::LANGUAGE.into(),
            splittable: &[
                "class_declaration",
                "interface_declaration",
                "enum_declaration",
                "record_declaration",
                "annotation_type_declaration",
                "method_declaration",
                "constructor_declaration",
            ],
        }),
        "c" => Some(LanguageConfig {
            language: tree_sitter_c::LANGUAGE.into(),
            splittable: &[
                "function_definition",
                "struct_specifier",
                "enum_specifier",
                "union_specifier",
                "type_definition",
            ],
        }),
        "cpp" => Some(LanguageConfig {
            language: tree_sitter_cpp::LANGUAGE.into(),
            splittable: &[
                "function_definition",
                "class_specifier",
                "struct_specifier",
                "enum_specifier",
                "union_specifier",
                "template_declaration",
                "namespace_definition",
                "type_definition",
            ],
        }),
        "csharp" => Some(LanguageConfig {
            language: tree_sitter_c_sharp::LANGUAGE.into(),
            splittable: &[
                "class_declaration",
                "interface_declaration",
                "struct_declaration",
                "enum_declaration",
                "record_declaration",
                "method_declaration",
                "constructor_declaration",
                "namespace_declaration",
            ],
        }),
        "php" => Some(LanguageConfig {
            language: tree_sitter_php::LANGUAGE_PHP.into(),
            splittable: &[
                "function_definition",
                "class_declaration",
                "interface_declaration",
                "trait_declaration",
                "enum_declaration",
                "method_declaration",
            ],
        }),
        "ruby" => Some(LanguageConfig {
            language: tree_sitter_ruby::LANGUAGE.into(),
            splittable: &["method", "singleton_method", "class", "module"],
        }),
        "swift" => Some(LanguageConfig {
            language: tree_sitter_swift::LANGUAGE.into(),
            splittable: &[
                "function_declaration",
                "class_declaration",
                "protocol_declaration",
            ],
        }),
        "kotlin" => Some(LanguageConfig {
            language: tree_sitter_kotlin_ng::LANGUAGE.into(),
            splittable: &[
                "function_declaration",
                "class_declaration",
                "object_declaration",
            ],
        }),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct Piece {
    range: Range<usize>,
    node_kind: Option<String>,
}

pub struct AstChunker {
    max_chunk_chars: usize,
    min_chunk_chars: usize,
    parsers: HashMap<String, Parser>,
}

impl AstChunker {
    pub fn new(max_chunk_chars: usize, min_chunk_chars: usize) -> Self {
        Self {
            max_chunk_chars,
            min_chunk_chars,
            parsers: HashMap::new(),
        }
    }

    pub fn max_chunk_chars(&self) -> usize {
        self.max_chunk_chars
    }

    pub fn min_chunk_chars(&self) -> usize {
        self.min_chunk_chars
    }

    /// Returns `None` when no grammar is available or parsing fails; the
    /// caller then takes the size-based fallback.
    pub fn chunk(
        &mut self,
        content: &str,
        language: &str,
        fallback: &TextSplitter,
    ) -> Option<Vec<Chunk>> {
        let config = language_config(language)?;
        let parser = self.get_parser(language, &config)?;
        let tree = parser.parse(content, None)?;

        let mut pieces = Vec::new();
        self.collect_top_level(
            tree.root_node(),
            content,
            config.splittable,
            fallback,
            &mut pieces,
        );
        if pieces.is_empty() {
            return Some(vec![]);
        }

        let merged = self.merge_small(pieces);
        let line_index = LineIndex::new(content);

        let chunks = merged
            .into_iter()
            .filter_map(|piece| trim_range(content, piece.range).map(|r| (r, piece.node_kind)))
            .map(|(range, node_kind)| {
                let (start_line, end_line) = line_index.lines_of(range.start, range.end);
                Chunk {
                    content: content[range].to_string(),
                    language: language.to_string(),
                    start_line,
                    end_line,
                    node_kind,
                }
            })
            .collect();

        Some(chunks)
    }

    fn get_parser(&mut self, language: &str, config: &LanguageConfig) -> Option<&mut Parser> {
        if !self.parsers.contains_key(language) {
            let mut parser = Parser::new();
            if parser.set_language(&config.language).is_err() {
                return None;
            }
            self.parsers.insert(language.to_string(), parser);
        }
        self.parsers.get_mut(language)
    }

    /// Walk the root's children; splittable nodes become chunks, everything
    /// between them accumulates into synthetic module pieces.
    fn collect_top_level(
        &self,
        root: Node,
        content: &str,
        splittable: &[&str],
        fallback: &TextSplitter,
        pieces: &mut Vec<Piece>,
    ) {
        let mut cursor_byte = 0usize;
        let mut walker = root.walk();

        for child in root.children(&mut walker) {
            if !splittable.contains(&child.kind()) {
                continue;
            }
            self.push_gap(content, cursor_byte..child.start_byte(), fallback, pieces);
            self.push_node(child, content, splittable, fallback, pieces);
            cursor_byte = child.end_byte();
        }

        self.push_gap(content, cursor_byte..content.len(), fallback, pieces);
    }

    fn push_node(
        &self,
        node: Node,
        content: &str,
        splittable: &[&str],
        fallback: &TextSplitter,
        pieces: &mut Vec<Piece>,
    ) {
        let range = node.start_byte()..node.end_byte();
        if range.len() <= self.max_chunk_chars {
            pieces.push(Piece {
                range,
                node_kind: Some(node.kind().to_string()),
            });
        } else if node.child_count() > 0 {
            self.split_oversized(node, content, splittable, fallback, pieces);
        } else {
            self.push_fallback(content, range, Some(node.kind().to_string()), fallback, pieces);
        }
    }

    /// Split an oversized node at the next grammatical level, greedily
    /// grouping consecutive children up to the size bound.
    fn split_oversized(
        &self,
        node: Node,
        content: &str,
        splittable: &[&str],
        fallback: &TextSplitter,
        pieces: &mut Vec<Piece>,
    ) {
        let kind = node.kind().to_string();
        let mut group: Option<Range<usize>> = None;
        let mut walker = node.walk();

        for child in node.children(&mut walker) {
            let child_range = child.start_byte()..child.end_byte();

            if child_range.len() > self.max_chunk_chars {
                if let Some(range) = group.take() {
                    pieces.push(Piece {
                        range,
                        node_kind: Some(kind.clone()),
                    });
                }
                if child.child_count() > 0 {
                    self.split_oversized(child, content, splittable, fallback, pieces);
                } else {
                    self.push_fallback(
                        content,
                        child_range,
                        Some(child.kind().to_string()),
                        fallback,
                        pieces,
                    );
                }
                continue;
            }

            group = Some(match group.take() {
                None => child_range,
                Some(range) => {
                    if child_range.end - range.start > self.max_chunk_chars {
                        pieces.push(Piece {
                            range,
                            node_kind: Some(kind.clone()),
                        });
                        child_range
                    } else {
                        range.start..child_range.end
                    }
                }
            });
        }

        if let Some(range) = group {
            pieces.push(Piece {
                range,
                node_kind: Some(kind.clone()),
            });
        }
    }

    fn push_gap(
        &self,
        content: &str,
        range: Range<usize>,
        fallback: &TextSplitter,
        pieces: &mut Vec<Piece>,
    ) {
        if range.is_empty() || content[range.clone()].trim().is_empty() {
            return;
        }
        if range.len() <= self.max_chunk_chars {
            pieces.push(Piece {
                range,
                node_kind: Some("module".to_string()),
            });
        } else {
            self.push_fallback(content, range, Some("module".to_string()), fallback, pieces);
        }
    }

    fn push_fallback(
        &self,
        content: &str,
        range: Range<usize>,
        node_kind: Option<String>,
        fallback: &TextSplitter,
        pieces: &mut Vec<Piece>,
    ) {
        for sub in fallback.split(&content[range.clone()]) {
            pieces.push(Piece {
                range: range.start + sub.start..range.start + sub.end,
                node_kind: node_kind.clone(),
            });
        }
    }

    /// Merge runs of small adjacent pieces while the combined span stays
    /// under the size bound.
    fn merge_small(&self, pieces: Vec<Piece>) -> Vec<Piece> {
        let mut merged: Vec<Piece> = Vec::new();

        for piece in pieces {
            if let Some(last) = merged.last_mut() {
                let both_small = last.range.len() < self.min_chunk_chars
                    && piece.range.len() < self.min_chunk_chars;
                let contiguous = piece.range.start >= last.range.start;
                let combined = piece.range.end.saturating_sub(last.range.start);
                if both_small && contiguous && combined <= self.max_chunk_chars {
                    last.range.end = last.range.end.max(piece.range.end);
                    continue;
                }
            }
            merged.push(piece);
        }

        merged
    }
}

/// Shrink a range to its non-whitespace extent; `None` if nothing is left.
fn trim_range(content: &str, range: Range<usize>) -> Option<Range<usize>> {
    let slice = &content[range.clone()];
    let first = slice.find(|c: char| !c.is_whitespace())?;
    let last = slice.rfind(|c: char| !c.is_whitespace())?;
    let last_end = last + slice[last..].chars().next().map(char::len_utf8).unwrap_or(1);
    Some(range.start + first..range.start + last_end)
}
