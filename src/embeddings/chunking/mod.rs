#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

/// Configuration for fixed-window chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window length in characters
    pub chunk_size: usize,
    /// Characters shared between the end of one window and the start of the next
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            overlap: 200,
        }
    }
}

impl ChunkingConfig {
    /// Distance between the starts of two consecutive windows
    #[inline]
    pub fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }
}

/// Split `text` into overlapping windows of `chunk_size` characters.
///
/// Windows start at 0 and advance by `chunk_size - overlap` until a window
/// reaches the end of the text, so the final window may be shorter. A start
/// that only covers text already inside the previous window's overlap is not
/// emitted. Lengths are counted in `char`s; a window never splits a
/// character. Output depends only on the text and the config, so chunk
/// positions are stable across rebuilds.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let stride = config.stride();
    let mut chunks = Vec::with_capacity(expected_chunk_count(chars.len(), config));

    if chars.is_empty() {
        return chunks;
    }

    let mut start = 0;
    loop {
        let end = (start + config.chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }

    chunks
}

/// Number of windows `chunk_text` produces for a text of `len` characters:
/// `ceil((len - overlap) / (chunk_size - overlap))`, at least 1 for non-empty text
#[inline]
pub fn expected_chunk_count(len: usize, config: &ChunkingConfig) -> usize {
    if len == 0 {
        return 0;
    }

    len.saturating_sub(config.overlap)
        .div_ceil(config.stride())
        .max(1)
}
