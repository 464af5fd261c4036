//! Byte encoding for embeddings kept in the identity store.
//!
//! Vectors are packed as little-endian f32 with no header. A set of
//! embeddings is the concatenation of its members, so the dimension must
//! be known to split it again. The empty buffer encodes the empty sentinel.

use crate::GalleryError;

pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>, GalleryError> {
    if bytes.len() % 4 != 0 {
        return Err(GalleryError::InvalidEncoding(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn encode_embeddings(embeddings: &[Vec<f32>]) -> Vec<u8> {
    embeddings.iter().flat_map(|e| encode_embedding(e)).collect()
}

/// Splits a packed embedding set into `dim`-length vectors.
pub fn decode_embeddings(bytes: &[u8], dim: usize) -> Result<Vec<Vec<f32>>, GalleryError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    if dim == 0 || bytes.len() % (dim * 4) != 0 {
        return Err(GalleryError::InvalidEncoding(bytes.len()));
    }
    bytes.chunks_exact(dim * 4).map(decode_embedding).collect()
}
