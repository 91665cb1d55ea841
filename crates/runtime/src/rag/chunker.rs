//! Fixed-window text chunker with overlap.

use super::types::IndexError;

/// A slice of a document produced by [`TextChunker`]
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    /// Start offset in characters
    pub start: usize,
    /// End offset in characters (exclusive)
    pub end: usize,
    pub index: usize,
}

/// Splits text into windows of at most `chunk_size` characters where
/// consecutive windows share exactly `chunk_overlap` characters.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IndexError> {
        if chunk_size == 0 {
            return Err(IndexError::InvalidChunking {
                reason: "chunk size must be greater than zero".to_string(),
            });
        }
        if chunk_overlap >= chunk_size {
            return Err(IndexError::InvalidChunking {
                reason: format!(
                    "chunk overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})"
                ),
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Chunk a document. Offsets are counted in Unicode scalar values so
    /// multi-byte text is never split inside a character.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let stride = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(chars.len());
            chunks.push(TextChunk {
                text: chars[start..end].iter().collect(),
                start,
                end,
                index: chunks.len(),
            });
            if end == chars.len() {
                break;
            }
            start += stride;
        }

        chunks
    }
}
