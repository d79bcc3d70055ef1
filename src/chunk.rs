//! Sliding-window text chunker.
//!
//! Splits normalized document text into overlapping windows of
//! `chunk_size` characters, advancing `chunk_size - overlap` characters at a
//! time. Windows are measured in Unicode scalar values, not bytes or tokens,
//! and boundaries ignore word and sentence structure.
//!
//! # Algorithm
//!
//! 1. `step = chunk_size - overlap`.
//! 2. Starting at offset 0, take the window `[start, start + chunk_size)`.
//! 3. Trim the window; keep it if anything is left.
//! 4. Advance `start += step` until `start >= len(text)`.
//!
//! Whitespace-only windows are dropped, so the chunk count has to be
//! obtained by walking the windows rather than by division.
//!
//! # Example
//!
//! ```rust
//! use doc_memory::chunk::chunk_text;
//!
//! let text = "x".repeat(1200);
//! let chunks = chunk_text(&text, 500, 50);
//! assert_eq!(chunks.len(), 3);
//! assert_eq!(chunks[2].chars().count(), 300);
//! ```

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap between consecutive windows in characters.
pub const DEFAULT_OVERLAP: usize = 50;

/// Split `text` into overlapping, trimmed, non-empty chunks.
///
/// # Panics
///
/// Panics if `overlap >= chunk_size`; configuration loading rejects such
/// values before they get here.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    assert!(
        overlap < chunk_size,
        "overlap ({}) must be smaller than chunk_size ({})",
        overlap,
        chunk_size
    );
    let step = chunk_size - overlap;

    // Byte offset of every char, plus the end of the string.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_len = bounds.len();
    bounds.push(text.len());

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < char_len {
        let end = (start + chunk_size).min(char_len);
        let window = text[bounds[start]..bounds[end]].trim();
        if !window.is_empty() {
            chunks.push(window.to_string());
        }
        start += step;
    }
    chunks
}
