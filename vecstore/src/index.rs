use crate::error::VecError;

/// QueryResult holds the nearest live slots for one probe, closest first.
///
/// `slots[i]` is at cosine distance `distances[i]` from the probe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub slots: Vec<usize>,
    pub distances: Vec<f32>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate `(slot, distance)` pairs in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.slots.iter().copied().zip(self.distances.iter().copied())
    }
}

/// SlotIndex stores fixed-dimension vectors under integer slots and answers
/// k-nearest-neighbor queries by cosine distance.
///
/// Slots are allocated in insertion order starting at 0 and are never
/// reused. A slot is either live or soft-deleted; soft-deleted slots keep
/// their handle but never appear in query results until overwritten by
/// [`SlotIndex::update_item`].
///
/// Every mutating method validates its input before touching any state, so
/// a failed call leaves the index exactly as it was.
pub trait SlotIndex: Send + Sync {
    /// Vector dimension accepted by this index.
    fn dim(&self) -> usize;

    /// Replace the whole index: slot `i` holds `vectors[i]` and no slot is
    /// deleted afterwards.
    fn bulk_load(&mut self, vectors: &[Vec<f32>]) -> Result<(), VecError>;

    /// Append a vector at the next free slot and return that slot.
    fn add_item(&mut self, vector: &[f32]) -> Result<usize, VecError>;

    /// Overwrite the vector at an allocated slot. A soft-deleted slot
    /// becomes live again.
    fn update_item(&mut self, slot: usize, vector: &[f32]) -> Result<(), VecError>;

    /// Exclude a slot from future query results. Idempotent.
    fn mark_deleted(&mut self, slot: usize) -> Result<(), VecError>;

    fn is_deleted(&self, slot: usize) -> bool;

    /// Soft-deleted slots in ascending order.
    fn deleted_slots(&self) -> Vec<usize>;

    /// Stored vector of an allocated slot, live or not.
    fn vector(&self, slot: usize) -> Option<&[f32]>;

    /// Return up to `k` nearest live slots ordered by ascending distance.
    ///
    /// `k` is clamped to the number of live slots; equal distances are
    /// ordered by slot. Fails with [`VecError::EmptyIndex`] when nothing is
    /// live.
    fn query(&self, probe: &[f32], k: usize) -> Result<QueryResult, VecError>;

    /// Number of allocated slots, including soft-deleted ones.
    fn size(&self) -> usize;

    /// Number of live slots.
    fn live_len(&self) -> usize {
        self.size() - self.deleted_slots().len()
    }
}

/// Reject empty vectors, vectors of the wrong dimension and non-finite
/// components.
pub(crate) fn check_vector(dim: usize, vector: &[f32]) -> Result<(), VecError> {
    if vector.is_empty() {
        return Err(VecError::EmptyEmbedding);
    }
    check_probe(dim, vector)
}

pub(crate) fn check_probe(dim: usize, probe: &[f32]) -> Result<(), VecError> {
    if probe.len() != dim {
        return Err(VecError::DimensionMismatch {
            got: probe.len(),
            want: dim,
        });
    }
    if let Some(index) = probe.iter().position(|x| !x.is_finite()) {
        return Err(VecError::NonFinite { index });
    }
    Ok(())
}

pub(crate) fn check_slot(slot: usize, size: usize) -> Result<(), VecError> {
    if slot >= size {
        return Err(VecError::InvalidSlot { slot, size });
    }
    Ok(())
}

/// Sort `(slot, distance)` candidates by distance then slot and keep the
/// first `k`.
pub(crate) fn rank(mut hits: Vec<(usize, f32)>, k: usize) -> QueryResult {
    hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    hits.truncate(k);

    let (slots, distances) = hits.into_iter().unzip();
    QueryResult { slots, distances }
}
