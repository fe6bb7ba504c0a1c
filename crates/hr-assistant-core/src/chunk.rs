//! Markdown-aware text chunker.
//!
//! The HR manual is a markdown document whose sections (`# Vacaciones`,
//! `## Solicitud`, ...) are the natural retrieval units. [`chunk_markdown`]
//! first cuts the document at the configured heading levels, remembering
//! the heading path of every section, then packs each section body into
//! paragraph-bounded chunks of at most `max_tokens`.
//!
//! # Algorithm
//!
//! 1. Walk the lines; an ATX heading whose level is in `split_levels`
//!    (outside fenced code blocks) closes the current section and updates
//!    the heading stack. Other headings stay in the body.
//! 2. Split each section body on `\n\n` and accumulate paragraphs until the
//!    next one would exceed `max_tokens × 4` characters.
//! 3. Paragraphs longer than the limit are hard-split at the nearest
//!    newline or space.
//! 4. With `overlap_tokens > 0`, every chunk after the first in a section
//!    starts with the tail of the previous one.
//! 5. At least one chunk is returned, even for empty input.
//!
//! Chunk ids are UUIDv5 values of `(document_id, chunk_index)`, so
//! re-indexing unchanged text yields the same ids.
//!
//! # Example
//!
//! ```rust
//! use hr_assistant_core::chunk::{chunk_markdown, ChunkOptions};
//!
//! let md = "# Vacaciones\n\nTienes 22 días.\n\n## Solicitud\n\nCon 15 días de antelación.";
//! let chunks = chunk_markdown("doc-1", md, &ChunkOptions::default());
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].heading.as_deref(), Some("Vacaciones > Solicitud"));
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Chunking knobs, mirrored from the `[chunking]` config section.
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    /// Heading levels that start a new section.
    pub split_levels: Vec<usize>,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_tokens: 250,
            overlap_tokens: 50,
            split_levels: vec![1, 2],
        }
    }
}

/// A run of body text under one heading path.
#[derive(Debug, Clone, PartialEq)]
struct Section {
    path: Vec<String>,
    body: String,
}

/// Split a markdown document into heading-scoped chunks.
pub fn chunk_markdown(document_id: &str, text: &str, opts: &ChunkOptions) -> Vec<Chunk> {
    let max_chars = opts.max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = opts.overlap_tokens * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    let mut index: i64 = 0;

    for section in split_sections(text, &opts.split_levels) {
        let heading = if section.path.is_empty() {
            None
        } else {
            Some(section.path.join(" > "))
        };

        let pieces = split_paragraphs(&section.body, max_chars);
        let mut previous: Option<&str> = None;
        for piece in &pieces {
            let body = match previous {
                Some(prev) if overlap_chars > 0 => {
                    let tail = overlap_tail(prev, overlap_chars);
                    if tail.is_empty() {
                        piece.clone()
                    } else {
                        format!("{tail}\n\n{piece}")
                    }
                }
                _ => piece.clone(),
            };
            chunks.push(make_chunk(document_id, index, heading.as_deref(), &body));
            index += 1;
            previous = Some(piece);
        }
    }

    if chunks.is_empty() {
        chunks.push(make_chunk(document_id, 0, None, text.trim()));
    }
    chunks
}

/// Paragraph-boundary chunker without section awareness.
///
/// Used for plain-text documents. Chunks carry no heading.
pub fn chunk_text(document_id: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut chunks: Vec<Chunk> = split_paragraphs(text, max_chars)
        .iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(document_id, i as i64, None, piece))
        .collect();
    if chunks.is_empty() {
        chunks.push(make_chunk(document_id, 0, None, text.trim()));
    }
    chunks
}

fn split_sections(text: &str, levels: &[usize]) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut body = String::new();
    let mut in_fence = false;

    let mut flush = |stack: &[(usize, String)], body: &mut String| {
        if !body.trim().is_empty() {
            sections.push(Section {
                path: stack.iter().map(|(_, t)| t.clone()).collect(),
                body: body.trim().to_string(),
            });
        }
        body.clear();
    };

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        let heading = if in_fence {
            None
        } else {
            parse_heading(line).filter(|(level, _)| levels.contains(level))
        };

        match heading {
            Some((level, title)) => {
                flush(&stack, &mut body);
                while stack.last().is_some_and(|(l, _)| *l >= level) {
                    stack.pop();
                }
                stack.push((level, title.to_string()));
            }
            None => {
                body.push_str(line);
                body.push('\n');
            }
        }
    }
    flush(&stack, &mut body);

    sections
}

/// Parse an ATX heading (`## Title`), returning its level and text.
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim();
    if title.is_empty() {
        None
    } else {
        Some((level, title))
    }
}

/// Pack paragraphs of `text` into pieces of at most `max_chars` bytes.
fn split_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        let joined_len = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };
        if joined_len > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if para.len() > max_chars {
            hard_split(para, max_chars, &mut pieces);
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(para);
        }
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }
    pieces
}

/// Cut an oversized paragraph at newline/space boundaries.
fn hard_split(para: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut rest = para;
    while !rest.is_empty() {
        if rest.len() <= max_chars {
            let piece = rest.trim();
            if !piece.is_empty() {
                out.push(piece.to_string());
            }
            break;
        }

        let limit = snap_to_char_boundary(rest, max_chars);
        let cut = if limit == 0 {
            rest.chars().next().map(char::len_utf8).unwrap_or(rest.len())
        } else {
            rest[..limit]
                .rfind(|c| c == '\n' || c == ' ')
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        };

        let piece = rest[..cut].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        rest = &rest[cut..];
    }
}

/// Trailing `max_chars` of `prev`, starting at a word boundary.
fn overlap_tail(prev: &str, max_chars: usize) -> &str {
    if prev.len() <= max_chars {
        return prev;
    }
    let start = snap_to_char_boundary(prev, prev.len() - max_chars);
    let start = prev[start..]
        .char_indices()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| start + i + c.len_utf8())
        .unwrap_or(start);
    prev[start..].trim()
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn make_chunk(document_id: &str, index: i64, heading: Option<&str>, text: &str) -> Chunk {
    // Covers the heading too: it is part of the embedded text.
    let mut hasher = Sha256::new();
    hasher.update(heading.unwrap_or("").as_bytes());
    hasher.update([0]);
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    let id = Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{document_id}:{index}").as_bytes(),
    );

    Chunk {
        id: id.to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        heading: heading.map(str::to_string),
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANUAL: &str = "\
Introducción general.

# Vacaciones

Cada empleado dispone de 22 días laborables al año.

## Solicitud

Las vacaciones se solicitan con 15 días de antelación.

### Aprobación

El responsable directo aprueba la solicitud.

# Bajas médicas

Se debe presentar el justificante en un plazo de 3 días.
";

    fn opts(max_tokens: usize, overlap_tokens: usize) -> ChunkOptions {
        ChunkOptions {
            max_tokens,
            overlap_tokens,
            split_levels: vec![1, 2],
        }
    }

    #[test]
    fn test_sections_carry_heading_path() {
        let chunks = chunk_markdown("doc1", MANUAL, &opts(250, 0));
        let headings: Vec<Option<&str>> = chunks.iter().map(|c| c.heading.as_deref()).collect();
        assert_eq!(
            headings,
            vec![
                None,
                Some("Vacaciones"),
                Some("Vacaciones > Solicitud"),
                Some("Bajas médicas"),
            ]
        );
    }

    #[test]
    fn test_deeper_headings_stay_in_body() {
        let chunks = chunk_markdown("doc1", MANUAL, &opts(250, 0));
        let solicitud = &chunks[2];
        assert!(solicitud.text.contains("### Aprobación"));
        assert!(solicitud.text.contains("aprueba la solicitud"));
    }

    #[test]
    fn test_sibling_heading_replaces_previous() {
        let md = "# A\n\nuno\n\n## B\n\ndos\n\n## C\n\ntres";
        let chunks = chunk_markdown("doc1", md, &opts(250, 0));
        assert_eq!(chunks[2].heading.as_deref(), Some("A > C"));
    }

    #[test]
    fn test_headings_inside_code_fence_ignored() {
        let md = "# Real\n\n```\n# not a heading\n```\n\ntexto";
        let chunks = chunk_markdown("doc1", md, &opts(250, 0));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("# not a heading"));
    }

    #[test]
    fn test_hashtag_is_not_heading() {
        assert_eq!(parse_heading("#rrhh"), None);
        assert_eq!(parse_heading("## Nóminas ##"), Some((2, "Nóminas")));
        assert_eq!(parse_heading("####### siete"), None);
    }

    #[test]
    fn test_overlap_prefixes_following_chunks() {
        let body = (0..12)
            .map(|i| format!("Frase número {i} de la sección de vacaciones."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let md = format!("# Vacaciones\n\n{body}");
        let chunks = chunk_markdown("doc1", &md, &opts(30, 5));
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prefix = pair[1].text.split("\n\n").next().unwrap();
            assert!(!prefix.is_empty());
            assert!(
                pair[0].text.ends_with(prefix),
                "chunk {} should overlap the end of chunk {}",
                pair[1].chunk_index,
                pair[0].chunk_index
            );
        }
    }

    #[test]
    fn test_indices_contiguous_across_sections() {
        let chunks = chunk_markdown("doc1", MANUAL, &opts(5, 1));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn test_ids_deterministic_and_unique() {
        let a = chunk_markdown("doc1", MANUAL, &ChunkOptions::default());
        let b = chunk_markdown("doc1", MANUAL, &ChunkOptions::default());
        assert_eq!(
            a.iter().map(|c| &c.id).collect::<Vec<_>>(),
            b.iter().map(|c| &c.id).collect::<Vec<_>>()
        );
        let mut ids: Vec<&str> = a.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), a.len());
    }

    #[test]
    fn test_empty_text_yields_one_chunk() {
        let chunks = chunk_markdown("doc1", "", &ChunkOptions::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        let plain = chunk_text("doc1", "", 100);
        assert_eq!(plain.len(), 1);
    }

    #[test]
    fn test_headings_only_document() {
        let chunks = chunk_markdown("doc1", "# Uno\n## Dos", &ChunkOptions::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading, None);
    }

    #[test]
    fn test_plain_chunker_splits_paragraphs() {
        let text = "Primer párrafo.\n\nSegundo párrafo.\n\nTercer párrafo.";
        assert_eq!(chunk_text("doc1", text, 700).len(), 1);
        let small = chunk_text("doc1", text, 5);
        assert!(small.len() > 1);
        assert!(small.iter().all(|c| c.heading.is_none()));
    }

    #[test]
    fn test_multibyte_hard_split() {
        let text = "ñ".repeat(50);
        let chunks = chunk_text("doc1", &text, 2);
        assert!(chunks.len() > 1);
        let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, text);
    }
}
