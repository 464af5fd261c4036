//! Face identity gallery.
//!
//! A [`Gallery`] enrolls named identities from images, stores their
//! per-image embeddings in an [`EmbeddingStore`], and answers "who is this?"
//! by searching a slot-addressed vector index of per-identity average
//! embeddings.
//!
//! The store is the system of record. The index is derived state: it is
//! rebuilt from the store on open and kept in step afterwards by the
//! [`IndexSynchronizer`], which also owns the slot → name table used to
//! label query results.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use facerec_gallery::{Config, Gallery, ImageInput, MemoryStore};
//!
//! let gallery = Gallery::open(Config::default(), Arc::new(MemoryStore::new()), extractor)?;
//! gallery.enroll("alice", &[ImageInput::new("alice.jpg", bytes)])?;
//!
//! for face in gallery.identify(&probe, Some(3))? {
//!     println!("{:?} -> {:?}", face.bbox, face.best());
//! }
//! ```

pub mod average;
pub mod config;
pub mod encoding;
pub mod error;
pub mod extractor;
pub mod gallery;
pub mod matches;
mod names;
pub mod redb_store;
pub mod store;
pub mod sync;

pub use average::{average, is_empty_embedding};
pub use config::{Config, HnswParams, IndexKind};
pub use error::GalleryError;
pub use extractor::{EmbeddingExtractor, Face, ImageInput};
pub use gallery::{Gallery, IdentityUpdate, UpdateOutcome};
pub use matches::{FaceMatches, Match};
pub use redb_store::RedbStore;
pub use store::{EmbeddingStore, IdentityRecord, ListQuery, MemoryStore};
pub use sync::{IndexSynchronizer, SlotState};
