//! Markdown chunking: headings at any level open a new chunk.

use pulldown_cmark::{Event, Parser, Tag};
use std::ops::Range;

use super::splitter::TextSplitter;
use super::{Chunk, LineIndex};

pub fn chunk_markdown(
    content: &str,
    max_chunk_chars: usize,
    min_chunk_chars: usize,
    fallback: &TextSplitter,
) -> Vec<Chunk> {
    let mut boundaries: Vec<usize> = Vec::new();
    for (event, range) in Parser::new(content).into_offset_iter() {
        if let Event::Start(Tag::Heading { .. }) = event {
            boundaries.push(range.start);
        }
    }

    let mut sections: Vec<Range<usize>> = Vec::new();
    let mut cursor = 0usize;
    for boundary in boundaries {
        if boundary > cursor {
            sections.push(cursor..boundary);
        }
        cursor = boundary;
    }
    if cursor < content.len() {
        sections.push(cursor..content.len());
    }

    let mut pieces: Vec<Range<usize>> = Vec::new();
    for section in sections {
        if content[section.clone()].trim().is_empty() {
            continue;
        }
        if section.len() <= max_chunk_chars {
            pieces.push(section);
        } else {
            for sub in fallback.split(&content[section.clone()]) {
                pieces.push(section.start + sub.start..section.start + sub.end);
            }
        }
    }

    // Same greedy merge as the code path: runs of small sections collapse.
    let mut merged: Vec<Range<usize>> = Vec::new();
    for piece in pieces {
        if let Some(last) = merged.last_mut() {
            let both_small = last.len() < min_chunk_chars && piece.len() < min_chunk_chars;
            let combined = piece.end.saturating_sub(last.start);
            if both_small && piece.start >= last.start && combined <= max_chunk_chars {
                last.end = last.end.max(piece.end);
                continue;
            }
        }
        merged.push(piece);
    }

    let line_index = LineIndex::new(content);
    merged
        .into_iter()
        .filter(|range| !content[range.clone()].trim().is_empty())
        .map(|range| {
            let (start_line, end_line) = line_index.lines_of(range.start, range.end);
            Chunk {
                content: content[range].trim_end().to_string(),
                language: "markdown".to_string(),
                start_line,
                end_line,
                node_kind: Some("heading".to_string()),
            }
        })
        .collect()
}
