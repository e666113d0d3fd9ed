//! Token-exact text chunker.
//!
//! Splits document text into overlapping windows of `cl100k_base` tokens.
//! With chunk size `C` and overlap fraction `f`, the overlap is
//! `O = floor(C * f)` tokens and windows start every `C - O` tokens, so
//! consecutive chunks share exactly `O` tokens at the boundary. The final
//! window may be shorter. Pure and deterministic: the same text always
//! produces the same chunk boundaries.

use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::error::{ErrorKind, Result, StructuredError};

/// Tokenizing window encoder with a fixed chunk size and overlap.
pub struct ChunkEncoder {
    bpe: CoreBPE,
    chunk_size: usize,
    overlap: usize,
}

impl ChunkEncoder {
    /// Build an encoder for `chunk_size` tokens with the given overlap
    /// fraction. Fails fast when the derived overlap would reach the
    /// chunk size, since a zero or negative step never terminates.
    pub fn new(chunk_size: usize, overlap_fraction: f64) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StructuredError::invalid_input(
                "chunk size must be at least one token",
            ));
        }
        if !overlap_fraction.is_finite() || overlap_fraction < 0.0 {
            return Err(StructuredError::invalid_input(
                "overlap fraction must be a non-negative number",
            ));
        }

        let overlap = (chunk_size as f64 * overlap_fraction).floor() as usize;
        if overlap >= chunk_size {
            return Err(StructuredError::invalid_input(format!(
                "overlap ({overlap} tokens) must be smaller than chunk size ({chunk_size} tokens)"
            )));
        }

        let bpe = cl100k_base().map_err(|e| {
            StructuredError::new(ErrorKind::Ingestion, "failed to load cl100k_base tokenizer")
                .with_details(e.to_string())
        })?;

        Ok(Self {
            bpe,
            chunk_size,
            overlap,
        })
    }

    /// Tokens shared between consecutive chunks.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Window size in tokens.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Token length of `text` under the encoder's tokenizer.
    pub fn token_count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Split `text` into chunk texts. Empty text yields an empty
    /// sequence; the caller decides whether that is an error.
    pub fn split(&self, text: &str) -> Result<Vec<String>> {
        let tokens = self.bpe.encode_ordinary(text);
        let mut chunks = Vec::new();

        for (start, end) in window_bounds(tokens.len(), self.chunk_size, self.overlap) {
            let window = tokens[start..end].to_vec();
            let chunk_text = self.bpe.decode(window).map_err(|e| {
                StructuredError::new(ErrorKind::Ingestion, "failed to decode token window")
                    .with_details(e.to_string())
            })?;
            chunks.push(chunk_text);
        }

        Ok(chunks)
    }
}

/// Window offsets for a token sequence of length `len`: starts at
/// `0, step, 2*step, …` while the start is in range, each window taking
/// up to `chunk_size` tokens. Requires `overlap < chunk_size`.
fn window_bounds(len: usize, chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    debug_assert!(overlap < chunk_size);
    let step = chunk_size - overlap;
    let mut bounds = Vec::new();
    let mut start = 0;
    while start < len {
        bounds.push((start, (start + chunk_size).min(len)));
        start += step;
    }
    bounds
}
