use std::collections::BTreeSet;

use crate::cosine::cosine_distance;
use crate::error::VecError;
use crate::index::{check_probe, check_slot, check_vector, rank, QueryResult, SlotIndex};

/// FlatIndex is an exact [`SlotIndex`] that scans every live slot on query.
///
/// Intended for galleries up to a few thousand entries, and as the ground
/// truth for approximate indexes in tests.
pub struct FlatIndex {
    dim: usize,
    vectors: Vec<Vec<f32>>,
    deleted: BTreeSet<usize>,
}

impl FlatIndex {
    /// Create an empty index. Panics if `dim` is 0.
    pub fn new(dim: usize) -> Self {
        assert!(dim > 0, "vecstore: FlatIndex dim must be positive");
        Self {
            dim,
            vectors: Vec::new(),
            deleted: BTreeSet::new(),
        }
    }
}

impl SlotIndex for FlatIndex {
    fn dim(&self) -> usize {
        self.dim
    }

    fn bulk_load(&mut self, vectors: &[Vec<f32>]) -> Result<(), VecError> {
        for v in vectors {
            check_vector(self.dim, v)?;
        }
        self.vectors = vectors.to_vec();
        self.deleted.clear();
        Ok(())
    }

    fn add_item(&mut self, vector: &[f32]) -> Result<usize, VecError> {
        check_vector(self.dim, vector)?;
        self.vectors.push(vector.to_vec());
        Ok(self.vectors.len() - 1)
    }

    fn update_item(&mut self, slot: usize, vector: &[f32]) -> Result<(), VecError> {
        check_slot(slot, self.vectors.len())?;
        check_vector(self.dim, vector)?;
        self.vectors[slot] = vector.to_vec();
        self.deleted.remove(&slot);
        Ok(())
    }

    fn mark_deleted(&mut self, slot: usize) -> Result<(), VecError> {
        check_slot(slot, self.vectors.len())?;
        self.deleted.insert(slot);
        Ok(())
    }

    fn is_deleted(&self, slot: usize) -> bool {
        self.deleted.contains(&slot)
    }

    fn deleted_slots(&self) -> Vec<usize> {
        self.deleted.iter().copied().collect()
    }

    fn vector(&self, slot: usize) -> Option<&[f32]> {
        self.vectors.get(slot).map(Vec::as_slice)
    }

    fn query(&self, probe: &[f32], k: usize) -> Result<QueryResult, VecError> {
        check_probe(self.dim, probe)?;
        let live = self.live_len();
        if live == 0 {
            return Err(VecError::EmptyIndex);
        }
        if k == 0 {
            return Ok(QueryResult::default());
        }

        let hits = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(slot, _)| !self.deleted.contains(slot))
            .map(|(slot, v)| (slot, cosine_distance(probe, v)))
            .collect();

        Ok(rank(hits, k.min(live)))
    }

    fn size(&self) -> usize {
        self.vectors.len()
    }

    fn live_len(&self) -> usize {
        self.vectors.len() - self.deleted.len()
    }
}
