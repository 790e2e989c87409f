use crate::error::IngestError;
use crate::models::Chunk;

pub const DEFAULT_CHUNK_SIZE: usize = 1_200;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Chunk length and overlap, both measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk_size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits `text` into overlapping chunks of at most `chunk_size` characters.
///
/// Cuts prefer a paragraph break, then a sentence end, then whitespace, and only
/// fall back to a hard cut when none of those appear in the back half of the
/// window. Every chunk after the first starts `overlap` characters before the
/// end of the previous one, and chunks are never trimmed, so the input can be
/// rebuilt by dropping each later chunk's first `overlap` characters.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let size = config.chunk_size.max(1);
    let overlap = config.overlap.min(size - 1);

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let window_end = (start + size).min(chars.len());
        let end = if window_end == chars.len() {
            window_end
        } else {
            find_cut(&chars, start, window_end, size, overlap)
        };

        chunks.push(Chunk {
            index: chunks.len(),
            text: chars[start..end].iter().collect(),
        });

        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }

    chunks
}

fn find_cut(chars: &[char], start: usize, window_end: usize, size: usize, overlap: usize) -> usize {
    // the chunk must outgrow the overlap or the next start would not advance
    let floor = start + (overlap + 1).max(size / 2);
    if floor >= window_end {
        return window_end;
    }

    let boundaries: [fn(&[char], usize) -> bool; 3] =
        [is_paragraph_break, is_sentence_end, is_word_break];

    for boundary in boundaries {
        if let Some(end) = (floor..=window_end).rev().find(|&end| boundary(chars, end)) {
            return end;
        }
    }

    window_end
}

fn is_paragraph_break(chars: &[char], end: usize) -> bool {
    end >= 2 && chars[end - 1] == '\n' && chars[end - 2] == '\n'
}

fn is_sentence_end(chars: &[char], end: usize) -> bool {
    end >= 2 && chars[end - 1].is_whitespace() && matches!(chars[end - 2], '.' | '!' | '?')
}

fn is_word_break(chars: &[char], end: usize) -> bool {
    end >= 1 && chars[end - 1].is_whitespace()
}
