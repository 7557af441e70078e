use crate::error::BuildError;
use crate::models::{Chunk, Document};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Chunking knobs, measured in characters. Both sizes must be positive,
/// with `overlap_chars` strictly below `chunk_chars` so the window
/// always advances.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_chars: usize,
    pub overlap_chars: usize,
    /// Numbered-heading pattern used to tag chunks with their contract section.
    pub section_heading_regex: &'static str,
}

impl ChunkingConfig {
    pub fn new(chunk_chars: usize, overlap_chars: usize) -> Self {
        Self {
            chunk_chars,
            overlap_chars,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if self.chunk_chars == 0 {
            return Err(BuildError::InvalidChunkConfig(
                "chunk_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars == 0 {
            return Err(BuildError::InvalidChunkConfig(
                "overlap_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.chunk_chars {
            return Err(BuildError::InvalidChunkConfig(format!(
                "overlap_chars {} must be smaller than chunk_chars {}",
                self.overlap_chars, self.chunk_chars
            )));
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 800,
            overlap_chars: 120,
            section_heading_regex: r"^\s*(?:SECTION\s+)?\d+(?:\.\d+)*[.)]\s+\S.*$",
        }
    }
}

/// Splits a document into overlapping chunks, left to right.
///
/// Each window extends up to `chunk_chars` characters and prefers to end on
/// a paragraph break, then a sentence end, then a word boundary, looking
/// back up to a quarter of the window before falling back to a hard cut.
/// The next window starts `overlap_chars` before the previous window's
/// actual end, so consecutive chunks always share the configured overlap
/// and the full text stays covered. Empty documents yield zero chunks.
pub fn split_document(document: &Document, config: ChunkingConfig) -> Result<Vec<Chunk>, BuildError> {
    config.validate()?;
    let heading_re = Regex::new(config.section_heading_regex)?;

    let chars: Vec<char> = document.text.chars().collect();
    if chars.iter().all(|c| c.is_whitespace()) {
        return Ok(Vec::new());
    }

    let lookback = (config.chunk_chars / 4).max(1);
    let mut chunks = Vec::new();
    let mut section_context: Option<String> = None;
    let mut start = 0usize;
    let mut index = 0u64;

    while start < chars.len() {
        let hard_end = (start + config.chunk_chars).min(chars.len());
        let end = if hard_end == chars.len() {
            hard_end
        } else {
            find_break(&chars, start, hard_end, lookback)
        };

        let text: String = chars[start..end].iter().collect();
        let trimmed = text.trim();

        if !trimmed.is_empty() {
            if let Some(heading) = detect_heading(&heading_re, &text) {
                section_context = Some(heading);
            }

            chunks.push(Chunk {
                chunk_id: make_chunk_id(&document.document_id, index, trimmed),
                document_id: document.document_id.clone(),
                source_label: document.title.clone(),
                chunk_index: index,
                start_offset: start,
                text: text.clone(),
                section: section_context.clone(),
                metadata: document.metadata.clone(),
            });
            index = index.saturating_add(1);
        }

        if end == chars.len() {
            break;
        }
        // Overlap is anchored on the actual break, not the hard limit, so
        // an early boundary break never opens a gap in coverage.
        start = end.saturating_sub(config.overlap_chars).max(start + 1);
    }

    Ok(chunks)
}

/// Picks the best break position in `(start, hard_end]`, preferring a
/// paragraph break, then a sentence end, then a word boundary within the
/// lookback window. Returns `hard_end` when no boundary is found.
fn find_break(chars: &[char], start: usize, hard_end: usize, lookback: usize) -> usize {
    let window_start = hard_end.saturating_sub(lookback).max(start + 1);

    let mut paragraph = None;
    let mut sentence = None;
    let mut word = None;

    for pos in (window_start..hard_end).rev() {
        if paragraph.is_none()
            && chars[pos] == '\n'
            && pos > 0
            && chars[pos - 1] == '\n'
        {
            paragraph = Some(pos + 1);
            break;
        }
        if sentence.is_none()
            && matches!(chars[pos], '.' | '!' | '?')
            && chars.get(pos + 1).is_some_and(|next| next.is_whitespace())
        {
            sentence = Some(pos + 1);
        }
        if word.is_none() && chars[pos].is_whitespace() {
            word = Some(pos + 1);
        }
    }

    paragraph.or(sentence).or(word).unwrap_or(hard_end)
}

fn detect_heading(heading_re: &Regex, text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && heading_re.is_match(line))
        .map(|line| line.to_string())
}

fn make_chunk_id(document_id: &str, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
