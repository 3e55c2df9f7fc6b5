//! Text chunking with configurable size and overlap.
//!
//! Windows are measured in characters (Unicode scalar values), so slicing
//! never splits a multi-byte sequence.

use crate::types::{Chunk, Document};
use mitra_core::{AppError, AppResult};
use sha2::{Digest, Sha256};

/// Split a document into overlapping windows of `size` characters.
///
/// Window `i` starts at `i * (size - overlap)` and iteration stops after the
/// window that reaches the end of the text. Empty text yields no chunks.
pub fn chunk_document(document: &Document, size: usize, overlap: usize) -> AppResult<Vec<Chunk>> {
    if size == 0 {
        return Err(AppError::InvalidConfiguration(
            "chunk size must be greater than 0".to_string(),
        ));
    }
    if overlap >= size {
        return Err(AppError::InvalidConfiguration(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            overlap, size
        )));
    }

    // Byte offset of every character, plus the end of the text.
    let mut boundaries: Vec<usize> = document.text.char_indices().map(|(i, _)| i).collect();
    let len = boundaries.len();
    boundaries.push(document.text.len());

    let stride = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut position = 0u32;

    while start < len {
        let end = (start + size).min(len);
        let text = &document.text[boundaries[start]..boundaries[end]];

        chunks.push(Chunk {
            id: chunk_id(&document.id, start, text),
            document_id: document.id.clone(),
            source: document.source.clone(),
            page: document.page,
            position,
            offset: start,
            text: text.to_string(),
        });

        if end == len {
            break;
        }
        start += stride;
        position += 1;
    }

    tracing::debug!(
        "Chunked {} into {} chunks (size: {}, overlap: {})",
        document.id,
        chunks.len(),
        size,
        overlap
    );

    Ok(chunks)
}

/// Content-derived chunk id: first 16 hex chars of SHA-256 over
/// (document id, offset, text).
pub fn chunk_id(document_id: &str, offset: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(offset.to_le_bytes());
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();

    digest
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}
