use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VecError {
    #[error("vecstore: dimension mismatch: got {got}, want {want}")]
    DimensionMismatch { got: usize, want: usize },

    #[error("vecstore: invalid slot {slot} (allocated: {size})")]
    InvalidSlot { slot: usize, size: usize },

    /// No live vectors to search. Callers usually treat this as "no match".
    #[error("vecstore: index has no live items")]
    EmptyIndex,

    #[error("vecstore: empty embedding")]
    EmptyEmbedding,

    /// A component is NaN or infinite.
    #[error("vecstore: non-finite value at component {index}")]
    NonFinite { index: usize },
}
