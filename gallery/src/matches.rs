use serde::Serialize;

/// One candidate identity for a probe embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    /// Index slot holding the identity's average embedding.
    pub slot: usize,

    pub name: String,

    /// Cosine distance to the probe. Lower is more similar.
    pub distance: f32,
}

impl Match {
    /// Cosine similarity, `1 - distance`.
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Ranked candidates for one detected face, closest first.
///
/// `names`, `distances` and `similarities` are parallel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FaceMatches {
    /// Face bounding box `[x1, y1, x2, y2]` when the probe came from an
    /// image.
    pub bbox: Option<[f32; 4]>,
    pub names: Vec<String>,
    pub distances: Vec<f32>,
    pub similarities: Vec<f32>,
}

impl FaceMatches {
    pub fn new(bbox: Option<[f32; 4]>, matches: Vec<Match>) -> Self {
        let mut out = Self {
            bbox,
            names: Vec::with_capacity(matches.len()),
            distances: Vec::with_capacity(matches.len()),
            similarities: Vec::with_capacity(matches.len()),
        };
        for m in matches {
            out.similarities.push(m.similarity());
            out.distances.push(m.distance);
            out.names.push(m.name);
        }
        out
    }

    /// Closest candidate and its similarity.
    pub fn best(&self) -> Option<(&str, f32)> {
        self.names
            .first()
            .zip(self.similarities.first())
            .map(|(n, &s)| (n.as_str(), s))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
