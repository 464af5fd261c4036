//! Slot-addressed vector indexes for nearest-neighbor search over dense
//! f32 embeddings.
//!
//! Every vector lives under an integer slot handed out in insertion order.
//! Slots can be overwritten in place and soft-deleted, but are never
//! reclaimed: a handle stays valid for the lifetime of the index, so callers
//! can keep parallel tables (names, metadata) keyed by slot.
//!
//! Two implementations of [`SlotIndex`] are provided:
//!
//! - [`FlatIndex`]: exact brute-force scan, suited to galleries of a few
//!   thousand entries.
//! - [`Hnsw`]: hierarchical navigable small world graph for larger
//!   galleries.
//!
//! Neither type does its own locking; wrap the index in a mutex when it is
//! shared between threads.

pub mod cosine;
pub mod error;
pub mod flat;
pub mod hnsw;
pub mod index;

pub use cosine::{cosine_distance, cosine_similarity};
pub use error::VecError;
pub use flat::FlatIndex;
pub use hnsw::{Hnsw, HnswConfig};
pub use index::{QueryResult, SlotIndex};
