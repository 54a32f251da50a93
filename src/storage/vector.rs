//! Embedding vector storage helpers.
//!
//! Vectors are stored as little-endian `f32` BLOBs.

use crate::error::StorageError;
use crate::Result;

/// Default vector dimension for embeddings (`text-embedding-ada-002` and
/// `text-embedding-3-small`).
pub const EMBEDDING_DIM: usize = 1536;

/// Convert a vector to a blob for storage.
#[must_use]
pub fn vector_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a blob back to a vector.
///
/// # Errors
///
/// Returns an error if the blob length is not a multiple of four bytes.
pub fn blob_to_vector(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(StorageError::Vector(format!(
            "blob of {} bytes is not a sequence of f32 values",
            blob.len()
        ))
        .into());
    }

    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
