use crate::GalleryError;

/// One detected face.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    /// Bounding box `[x1, y1, x2, y2]` in image pixels.
    pub bbox: [f32; 4],

    /// Face embedding of [`EmbeddingExtractor::dimension`] values.
    pub embedding: Vec<f32>,
}

/// An image submitted for enrollment.
#[derive(Debug, Clone)]
pub struct ImageInput {
    /// Reference recorded on the identity (file name, object key, ...).
    pub reference: String,

    /// Encoded image bytes handed to the extractor.
    pub data: Vec<u8>,
}

impl ImageInput {
    pub fn new(reference: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            reference: reference.into(),
            data: data.into(),
        }
    }
}

/// Detects faces in an encoded image and embeds each one.
///
/// This wraps the face model; the gallery treats it as a black box. It is
/// CPU/GPU heavy, so the gallery always calls it before taking the index
/// lock.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use.
pub trait EmbeddingExtractor: Send + Sync {
    /// Returns zero or more faces, most prominent first.
    fn extract(&self, image: &[u8]) -> Result<Vec<Face>, GalleryError>;

    /// Returns the dimensionality of the embedding vectors (e.g., 512).
    fn dimension(&self) -> usize;
}
