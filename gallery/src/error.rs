use facerec_vecstore::VecError;
use thiserror::Error;

/// Errors returned by gallery operations.
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error(transparent)]
    Index(#[from] VecError),

    #[error("gallery: store error: {0}")]
    Store(String),

    #[error("gallery: serialization error: {0}")]
    Serialization(String),

    #[error("gallery: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("gallery: invalid embedding buffer of {0} bytes")]
    InvalidEncoding(usize),

    #[error("gallery: {names} names for {vectors} vectors")]
    LengthMismatch { names: usize, vectors: usize },

    #[error("gallery: duplicate name {0:?}")]
    DuplicateName(String),

    /// A rename targeted a name that already owns another slot.
    #[error("gallery: name {name:?} already owns slot {slot}")]
    NameConflict { name: String, slot: usize },

    #[error("gallery: identity {0:?} not found")]
    NotFound(String),

    #[error("gallery: identity {0:?} already exists")]
    AlreadyExists(String),

    #[error("gallery: extractor error: {0}")]
    Extractor(String),
}

impl GalleryError {
    pub(crate) fn store<E: std::fmt::Display>(e: E) -> Self {
        Self::Store(e.to_string())
    }
}
