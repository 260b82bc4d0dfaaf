//! Fixed-window text chunker.
//!
//! Splits document text into windows of `size` characters where each
//! window starts `size - overlap` characters after the previous one.
//! Positions are counted in Unicode scalar values so a window never cuts
//! a multi-byte character in half.

use thiserror::Error;

/// Maximum length of the preview stored with each chunk.
pub const PREVIEW_CHARS: usize = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid chunk window: size {size}, overlap {overlap} (need size > 0 and overlap < size)")]
    InvalidWindow { size: usize, overlap: usize },
}

/// Split `text` into overlapping windows.
///
/// Text no longer than `size` comes back as a single chunk, including the
/// empty string.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, ChunkError> {
    if size == 0 || overlap >= size {
        return Err(ChunkError::InvalidWindow { size, overlap });
    }

    // Byte offset of every char boundary, plus the end of the string.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_len = bounds.len();
    bounds.push(text.len());

    if char_len <= size {
        return Ok(vec![text.to_string()]);
    }

    let step = size - overlap;
    let mut chunks = Vec::with_capacity(char_len / step + 1);
    let mut start = 0;
    while start < char_len {
        let end = (start + size).min(char_len);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        start += step;
    }

    Ok(chunks)
}

/// Truncate to [`PREVIEW_CHARS`] characters, then drop anything non-ASCII.
pub fn preview(text: &str) -> String {
    text.chars()
        .take(PREVIEW_CHARS)
        .filter(char::is_ascii)
        .collect()
}

pub fn chunk_id(source: &str, index: usize) -> String {
    format!("{}-chunk-{}", source, index)
}
