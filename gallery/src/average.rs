use crate::GalleryError;

/// Returns true for the empty-embedding sentinel: an identity with no
/// usable face data.
pub fn is_empty_embedding(embedding: &[f32]) -> bool {
    embedding.is_empty()
}

/// Reduces one identity's per-image embeddings to their elementwise mean.
///
/// An empty input yields the empty sentinel, never a zero vector of full
/// dimension. Embeddings of differing lengths are rejected.
pub fn average(embeddings: &[Vec<f32>]) -> Result<Vec<f32>, GalleryError> {
    let Some(first) = embeddings.first() else {
        return Ok(Vec::new());
    };
    let dim = first.len();

    let mut sum = vec![0.0f64; dim];
    for emb in embeddings {
        if emb.len() != dim {
            return Err(GalleryError::DimensionMismatch {
                expected: dim,
                got: emb.len(),
            });
        }
        for (acc, &x) in sum.iter_mut().zip(emb) {
            *acc += x as f64;
        }
    }

    let n = embeddings.len() as f64;
    Ok(sum.into_iter().map(|s| (s / n) as f32).collect())
}
