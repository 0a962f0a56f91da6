//! Text chunking with character offsets
//!
//! Sizes are measured in characters (Unicode scalar values), never bytes.
//! Each chunk ends at the best break found in a short lookback window before
//! the hard limit, and the next chunk starts exactly `overlap` characters
//! before that end.

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};

/// A contiguous slice of the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position within the document, starting at 0
    pub ordinal: u32,
    /// Chunk text
    pub text: String,
    /// Character offset of the first character
    pub char_start: usize,
    /// Character offset one past the last character
    pub char_end: usize,
}

impl TextChunk {
    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}

/// Text chunker with configurable size and overlap
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Characters shared by consecutive chunks
    overlap: usize,
    /// Lookback from the hard limit when searching for a break
    boundary_window: usize,
}

impl Chunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize, boundary_window: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::config("chunk_size must be positive"));
        }
        if overlap >= chunk_size {
            return Err(Error::config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            overlap,
            boundary_window,
        })
    }

    /// Create a chunker from the chunking section of the config
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap, config.boundary_window)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily split `text` into chunks. Whitespace-only text yields nothing.
    pub fn chunks<'a>(&self, text: &'a str) -> ChunkIter<'a> {
        let finished = text.trim().is_empty();
        let offsets = if finished {
            vec![0]
        } else {
            text.char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(text.len()))
                .collect()
        };

        ChunkIter {
            text,
            offsets,
            chunker: *self,
            start: 0,
            ordinal: 0,
            finished,
        }
    }
}

/// Iterator over the chunks of one text
#[derive(Debug, Clone)]
pub struct ChunkIter<'a> {
    text: &'a str,
    /// Byte offset of every character, plus the text length
    offsets: Vec<usize>,
    chunker: Chunker,
    start: usize,
    ordinal: u32,
    finished: bool,
}

impl ChunkIter<'_> {
    fn char_count(&self) -> usize {
        self.offsets.len() - 1
    }

    fn char_at(&self, index: usize) -> char {
        self.text[self.offsets[index]..]
            .chars()
            .next()
            .unwrap_or_default()
    }

    /// End offset for a chunk that cannot reach the end of the text.
    ///
    /// A candidate `p` ends the chunk just before character `p`. Candidates
    /// never go below `start + overlap + 1` so the next chunk always advances.
    fn break_point(&self, limit: usize) -> usize {
        let floor = limit
            .saturating_sub(self.chunker.boundary_window)
            .max(self.start + self.chunker.overlap + 1);
        if floor > limit {
            return limit;
        }

        let line_break = (floor..=limit).rev().find(|&p| self.char_at(p - 1) == '\n');
        if let Some(p) = line_break {
            return p;
        }

        let sentence_end = (floor..=limit).rev().find(|&p| {
            matches!(self.char_at(p - 1), '.' | '!' | '?') && self.char_at(p).is_whitespace()
        });
        if let Some(p) = sentence_end {
            return p;
        }

        (floor..=limit)
            .rev()
            .find(|&p| self.char_at(p - 1).is_whitespace())
            .unwrap_or(limit)
    }
}

impl Iterator for ChunkIter<'_> {
    type Item = TextChunk;

    fn next(&mut self) -> Option<TextChunk> {
        if self.finished {
            return None;
        }

        let len = self.char_count();
        let limit = (self.start + self.chunker.chunk_size).min(len);
        let end = if limit == len {
            self.finished = true;
            len
        } else {
            self.break_point(limit)
        };

        let chunk = TextChunk {
            ordinal: self.ordinal,
            text: self.text[self.offsets[self.start]..self.offsets[end]].to_string(),
            char_start: self.start,
            char_end: end,
        };

        self.ordinal += 1;
        if !self.finished {
            // break_point never returns below start + overlap + 1
            self.start = end - self.chunker.overlap;
        }
        Some(chunk)
    }
}
