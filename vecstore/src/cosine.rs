/// Cosine similarity between two vectors in `[-1, 1]`.
///
/// Accumulates in f64. Returns `None` when the lengths differ or either
/// vector has zero norm, since the angle is undefined there.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    // sqrt of the product keeps identical vectors at exactly 1.0; the clamp
    // absorbs rounding on other (anti)parallel pairs.
    Some((dot / (norm_a * norm_b).sqrt()).clamp(-1.0, 1.0))
}

/// Cosine distance `1 - cos(a, b)` in `[0, 2]`; smaller is more similar.
///
/// Zero vectors and dimension mismatches are maximally distant (2.0) so
/// they sink to the end of any ranking.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    match cosine_similarity(a, b) {
        Some(sim) => (1.0 - sim) as f32,
        None => 2.0,
    }
}
