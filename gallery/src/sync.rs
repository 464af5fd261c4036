use facerec_vecstore::{SlotIndex, VecError};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::GalleryError;
use crate::average::is_empty_embedding;
use crate::matches::Match;
use crate::names::NameTable;
use crate::store::EmbeddingStore;

/// Index presence of one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Never had an embedding, so never got a slot.
    NoSlot,
    /// Returned by queries.
    Live(usize),
    /// Soft-deleted; the slot is kept for the name and may come back.
    Deleted(usize),
}

struct SyncState {
    index: Box<dyn SlotIndex>,
    names: NameTable,
}

/// Keeps a [`SlotIndex`] and its slot → name table in lockstep with
/// identity-level changes.
///
/// This is the only writer of the name table. One mutex guards both the
/// index and the table for the whole of every operation, queries included.
/// Callers commit to the [`EmbeddingStore`] first and then report the change
/// here; embedding extraction must happen before calling in.
///
/// Per identity the slot moves `NoSlot → Live ⇄ Deleted`. Slots are never
/// freed; only [`IndexSynchronizer::on_delete_all`] starts over.
pub struct IndexSynchronizer {
    state: Mutex<SyncState>,
}

impl IndexSynchronizer {
    /// Wraps an index. Anything already in `index` is discarded.
    pub fn new(mut index: Box<dyn SlotIndex>) -> Self {
        if index.size() > 0 {
            let cleared = index.bulk_load(&[]);
            debug_assert!(cleared.is_ok(), "loading nothing cannot fail");
        }
        Self {
            state: Mutex::new(SyncState {
                index,
                names: NameTable::default(),
            }),
        }
    }

    /// Rebuilds the index from the store's average embeddings.
    ///
    /// Identities without an embedding get no slot. Returns the number of
    /// slots loaded.
    pub fn initialize(&self, store: &dyn EmbeddingStore) -> Result<usize, GalleryError> {
        let identities = store.list_identities()?;
        let total = identities.len();

        let mut names = Vec::with_capacity(total);
        let mut vectors = Vec::with_capacity(total);
        for (name, average) in identities {
            if is_empty_embedding(&average) {
                debug!(name = %name, "gallery: identity has no embedding, no slot");
                continue;
            }
            names.push(name);
            vectors.push(average);
        }

        let loaded = names.len();
        self.bulk_load(names, vectors)?;
        info!(
            identities = total,
            slots = loaded,
            "gallery: index initialized from store"
        );
        Ok(loaded)
    }

    /// Replaces index contents and name table: `names[i]` owns slot `i`
    /// holding `vectors[i]`. On error nothing changes.
    pub fn bulk_load(
        &self,
        names: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), GalleryError> {
        if names.len() != vectors.len() {
            return Err(GalleryError::LengthMismatch {
                names: names.len(),
                vectors: vectors.len(),
            });
        }
        let table = NameTable::from_names(names)?;

        let mut st = self.state.lock();
        st.index.bulk_load(&vectors)?;
        st.names = table;
        st.check_invariant();
        Ok(())
    }

    /// Records a new identity. An empty `average` leaves the index alone.
    ///
    /// If `name` still resolves to a slot (deleted and re-created), that
    /// slot is reused. Returns the identity's slot, if any.
    pub fn on_create(&self, name: &str, average: &[f32]) -> Result<Option<usize>, GalleryError> {
        let mut st = self.state.lock();
        st.create(name, average)
    }

    /// Applies a rename and/or new average embedding to `old_name`.
    ///
    /// An empty `average` soft-deletes the slot; a non-empty one overwrites
    /// it in place and brings a deleted slot back. The slot keeps its
    /// number across renames. Returns the identity's slot, if any.
    pub fn on_update(
        &self,
        old_name: &str,
        new_name: &str,
        average: &[f32],
    ) -> Result<Option<usize>, GalleryError> {
        let mut st = self.state.lock();
        st.update(old_name, new_name, average)
    }

    /// Soft-deletes `name`'s slot, if it has one.
    pub fn on_delete(&self, name: &str) -> Result<Option<usize>, GalleryError> {
        self.on_update(name, name, &[])
    }

    /// Drops every slot, name and deletion mark.
    pub fn on_delete_all(&self) -> Result<(), GalleryError> {
        let mut st = self.state.lock();
        let dropped = st.index.size();
        st.index.bulk_load(&[])?;
        st.names.clear();
        st.check_invariant();
        info!(slots = dropped, "gallery: index cleared");
        Ok(())
    }

    /// Nearest live identities to `probe`, closest first.
    ///
    /// An index with nothing live yields no matches rather than an error.
    pub fn query(&self, probe: &[f32], k: usize) -> Result<Vec<Match>, GalleryError> {
        let st = self.state.lock();
        st.query(probe, k)
    }

    /// Runs [`IndexSynchronizer::query`] for each probe under one lock.
    pub fn query_many(
        &self,
        probes: &[Vec<f32>],
        k: usize,
    ) -> Result<Vec<Vec<Match>>, GalleryError> {
        let st = self.state.lock();
        probes.iter().map(|p| st.query(p, k)).collect()
    }

    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.state.lock().names.slot_of(name)
    }

    pub fn name_of(&self, slot: usize) -> Option<String> {
        self.state.lock().names.name_of(slot).map(str::to_string)
    }

    pub fn state_of(&self, name: &str) -> SlotState {
        let st = self.state.lock();
        match st.names.slot_of(name) {
            None => SlotState::NoSlot,
            Some(slot) if st.index.is_deleted(slot) => SlotState::Deleted(slot),
            Some(slot) => SlotState::Live(slot),
        }
    }

    /// Stored vector of `name`'s slot, live or deleted.
    pub fn vector_of(&self, name: &str) -> Option<Vec<f32>> {
        let st = self.state.lock();
        let slot = st.names.slot_of(name)?;
        st.index.vector(slot).map(<[f32]>::to_vec)
    }

    /// Snapshot of the slot → name table.
    pub fn names(&self) -> Vec<String> {
        self.state.lock().names.names().to_vec()
    }

    pub fn deleted_slots(&self) -> Vec<usize> {
        self.state.lock().index.deleted_slots()
    }

    /// Allocated slots, including soft-deleted ones.
    pub fn size(&self) -> usize {
        self.state.lock().index.size()
    }

    pub fn live_len(&self) -> usize {
        self.state.lock().index.live_len()
    }

    pub fn dim(&self) -> usize {
        self.state.lock().index.dim()
    }
}

impl SyncState {
    fn create(&mut self, name: &str, average: &[f32]) -> Result<Option<usize>, GalleryError> {
        if is_empty_embedding(average) {
            debug!(name, "gallery: created without embedding, no slot");
            return Ok(None);
        }
        if self.names.slot_of(name).is_some() {
            return self.update(name, name, average);
        }

        let slot = self.index.add_item(average)?;
        let named = self.names.push(name);
        debug_assert_eq!(slot, named);
        self.check_invariant();
        debug!(name, slot, "gallery: slot added");
        Ok(Some(slot))
    }

    fn update(
        &mut self,
        old_name: &str,
        new_name: &str,
        average: &[f32],
    ) -> Result<Option<usize>, GalleryError> {
        let current = self.names.slot_of(old_name);
        if old_name != new_name {
            if let Some(other) = self.names.slot_of(new_name) {
                if current != Some(other) && !self.index.is_deleted(other) {
                    return Err(GalleryError::NameConflict {
                        name: new_name.to_string(),
                        slot: other,
                    });
                }
            }
        }

        let Some(slot) = current else {
            return self.create(new_name, average);
        };

        if is_empty_embedding(average) {
            self.index.mark_deleted(slot)?;
            debug!(name = new_name, slot, "gallery: slot marked deleted");
        } else {
            let was_deleted = self.index.is_deleted(slot);
            self.index.update_item(slot, average)?;
            if was_deleted {
                debug!(name = new_name, slot, "gallery: slot restored");
            } else {
                debug!(name = new_name, slot, "gallery: slot updated");
            }
        }

        if old_name != new_name {
            self.names.rename(slot, new_name);
            debug!(old = old_name, new = new_name, slot, "gallery: slot renamed");
        }
        self.check_invariant();
        Ok(Some(slot))
    }

    fn query(&self, probe: &[f32], k: usize) -> Result<Vec<Match>, GalleryError> {
        let res = match self.index.query(probe, k) {
            Ok(res) => res,
            Err(VecError::EmptyIndex) => {
                debug!("gallery: query against empty index");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(res
            .iter()
            .map(|(slot, distance)| Match {
                slot,
                name: self.names.name_of(slot).unwrap_or_default().to_string(),
                distance,
            })
            .collect())
    }

    fn check_invariant(&self) {
        debug_assert_eq!(
            self.names.len(),
            self.index.size(),
            "name table and index out of step"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facerec_vecstore::{FlatIndex, SlotIndex};

    fn sync(dim: usize) -> IndexSynchronizer {
        IndexSynchronizer::new(Box::new(FlatIndex::new(dim)))
    }

    #[test]
    fn create_assigns_slots_in_order() {
        let s = sync(2);
        assert_eq!(s.on_create("alice", &[1.0, 0.0]).unwrap(), Some(0));
        assert_eq!(s.on_create("bob", &[0.0, 1.0]).unwrap(), Some(1));
        assert_eq!(s.names(), vec!["alice", "bob"]);
        assert_eq!(s.size(), 2);
    }

    #[test]
    fn create_without_embedding_takes_no_slot() {
        let s = sync(2);
        assert_eq!(s.on_create("ghost", &[]).unwrap(), None);
        assert_eq!(s.size(), 0);
        assert_eq!(s.state_of("ghost"), SlotState::NoSlot);
    }

    #[test]
    fn update_without_slot_creates() {
        let s = sync(2);
        assert_eq!(s.on_update("ghost", "casper", &[1.0, 0.0]).unwrap(), Some(0));
        assert_eq!(s.slot_of("casper"), Some(0));
        assert_eq!(s.slot_of("ghost"), None);

        assert_eq!(s.on_update("nobody", "nobody", &[]).unwrap(), None);
        assert_eq!(s.size(), 1);
    }

    #[test]
    fn delete_then_update_resurrects() {
        let s = sync(2);
        s.on_create("alice", &[1.0, 0.0]).unwrap();
        s.on_create("bob", &[0.0, 1.0]).unwrap();

        assert_eq!(s.on_update("alice", "alice", &[]).unwrap(), Some(0));
        assert_eq!(s.state_of("alice"), SlotState::Deleted(0));
        assert_eq!(s.deleted_slots(), vec![0]);

        assert_eq!(s.on_update("alice", "alice", &[1.0, 0.1]).unwrap(), Some(0));
        assert_eq!(s.state_of("alice"), SlotState::Live(0));
        assert_eq!(s.query(&[1.0, 0.0], 1).unwrap()[0].name, "alice");
        assert_eq!(s.size(), 2);
    }

    #[test]
    fn recreate_reuses_slot() {
        let s = sync(2);
        s.on_create("alice", &[1.0, 0.0]).unwrap();
        s.on_create("bob", &[0.0, 1.0]).unwrap();
        s.on_delete("alice").unwrap();

        assert_eq!(s.on_create("alice", &[0.5, 0.5]).unwrap(), Some(0));
        assert_eq!(s.size(), 2);
        assert!(s.deleted_slots().is_empty());
        assert_eq!(s.vector_of("alice"), Some(vec![0.5, 0.5]));
    }

    #[test]
    fn rename_keeps_slot() {
        let s = sync(2);
        s.on_create("alice", &[1.0, 0.0]).unwrap();
        s.on_create("bob", &[0.0, 1.0]).unwrap();

        assert_eq!(s.on_update("alice", "alicia", &[1.0, 0.0]).unwrap(), Some(0));
        assert_eq!(s.slot_of("alicia"), Some(0));
        assert_eq!(s.slot_of("alice"), None);
        let m = s.query(&[1.0, 0.0], 1).unwrap();
        assert_eq!((m[0].slot, m[0].name.as_str()), (0, "alicia"));
    }

    #[test]
    fn rename_while_deleting_keeps_label() {
        let s = sync(2);
        s.on_create("alice", &[1.0, 0.0]).unwrap();
        s.on_update("alice", "alicia", &[]).unwrap();
        assert_eq!(s.name_of(0).as_deref(), Some("alicia"));
        assert_eq!(s.state_of("alicia"), SlotState::Deleted(0));
    }

    #[test]
    fn rename_onto_live_name_rejected() {
        let s = sync(2);
        s.on_create("alice", &[1.0, 0.0]).unwrap();
        s.on_create("bob", &[0.0, 1.0]).unwrap();

        let err = s.on_update("alice", "bob", &[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, GalleryError::NameConflict { slot: 1, .. }));
        // Nothing changed.
        assert_eq!(s.vector_of("alice"), Some(vec![1.0, 0.0]));
        assert_eq!(s.names(), vec!["alice", "bob"]);
    }

    #[test]
    fn rename_without_slot_onto_live_name_rejected() {
        let s = sync(2);
        s.on_create("bob", &[0.0, 1.0]).unwrap();

        let err = s.on_update("ghost", "bob", &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, GalleryError::NameConflict { slot: 0, .. }));
        assert!(matches!(
            s.on_update("ghost", "bob", &[]),
            Err(GalleryError::NameConflict { slot: 0, .. })
        ));
        assert_eq!(s.vector_of("bob"), Some(vec![0.0, 1.0]));
        assert_eq!(s.size(), 1);
    }

    #[test]
    fn rename_without_slot_onto_deleted_name_reuses_it() {
        let s = sync(2);
        s.on_create("bob", &[0.0, 1.0]).unwrap();
        s.on_delete("bob").unwrap();

        assert_eq!(s.on_update("ghost", "bob", &[1.0, 0.0]).unwrap(), Some(0));
        assert_eq!(s.state_of("bob"), SlotState::Live(0));
        assert_eq!(s.vector_of("bob"), Some(vec![1.0, 0.0]));
    }

    #[test]
    fn new_discards_existing_contents() {
        let mut index = FlatIndex::new(2);
        index.add_item(&[1.0, 0.0]).unwrap();
        let s = IndexSynchronizer::new(Box::new(index));
        assert_eq!(s.size(), 0);
        assert_eq!(s.on_create("alice", &[1.0, 0.0]).unwrap(), Some(0));
    }

    #[test]
    fn rename_onto_deleted_name_takes_it_over() {
        let s = sync(2);
        s.on_create("alice", &[1.0, 0.0]).unwrap();
        s.on_create("bob", &[0.0, 1.0]).unwrap();
        s.on_delete("bob").unwrap();

        assert_eq!(s.on_update("alice", "bob", &[1.0, 0.0]).unwrap(), Some(0));
        assert_eq!(s.slot_of("bob"), Some(0));
        assert_eq!(s.state_of("bob"), SlotState::Live(0));
        assert_eq!(s.size(), 2);
    }

    #[test]
    fn failed_update_leaves_state() {
        let s = sync(2);
        s.on_create("alice", &[1.0, 0.0]).unwrap();
        let err = s.on_update("alice", "alicia", &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            GalleryError::Index(VecError::DimensionMismatch { got: 1, want: 2 })
        ));
        assert_eq!(s.slot_of("alice"), Some(0));
        assert_eq!(s.slot_of("alicia"), None);

        assert!(s.on_create("bob", &[1.0, 2.0, 3.0]).is_err());
        assert_eq!(s.size(), 1);
        assert_eq!(s.names().len(), 1);
    }

    #[test]
    fn delete_all_resets() {
        let s = sync(2);
        s.on_create("alice", &[1.0, 0.0]).unwrap();
        s.on_create("bob", &[0.0, 1.0]).unwrap();
        s.on_delete("bob").unwrap();

        s.on_delete_all().unwrap();
        assert_eq!(s.size(), 0);
        assert!(s.names().is_empty());
        assert!(s.deleted_slots().is_empty());
        assert!(s.query(&[1.0, 0.0], 3).unwrap().is_empty());

        assert_eq!(s.on_create("carol", &[1.0, 0.0]).unwrap(), Some(0));
    }

    #[test]
    fn query_skips_deleted_and_clamps() {
        let s = sync(2);
        s.on_create("alice", &[1.0, 0.0]).unwrap();
        s.on_create("bob", &[0.0, 1.0]).unwrap();
        s.on_delete("alice").unwrap();

        let m = s.query(&[1.0, 0.0], 2).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].name, "bob");
    }

    #[test]
    fn query_wrong_dimension_errors() {
        let s = sync(2);
        s.on_create("alice", &[1.0, 0.0]).unwrap();
        assert!(s.query(&[1.0], 1).is_err());
    }

    #[test]
    fn bulk_load_validation() {
        let s = sync(2);
        assert!(matches!(
            s.bulk_load(vec!["a".into()], vec![]),
            Err(GalleryError::LengthMismatch { names: 1, vectors: 0 })
        ));
        assert!(matches!(
            s.bulk_load(
                vec!["a".into(), "a".into()],
                vec![vec![1.0, 0.0], vec![0.0, 1.0]]
            ),
            Err(GalleryError::DuplicateName(_))
        ));

        s.bulk_load(vec!["a".into(), "b".into()], vec![vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();
        assert_eq!(s.slot_of("b"), Some(1));

        assert!(s.bulk_load(vec!["c".into()], vec![vec![1.0]]).is_err());
        assert_eq!(s.names(), vec!["a", "b"]);
    }

    #[test]
    fn query_many_per_vector() {
        let s = sync(2);
        s.on_create("alice", &[1.0, 0.0]).unwrap();
        s.on_create("bob", &[0.0, 1.0]).unwrap();

        let res = s.query_many(&[vec![0.0, 1.0], vec![1.0, 0.0]], 1).unwrap();
        assert_eq!(res[0][0].name, "bob");
        assert_eq!(res[1][0].name, "alice");
    }
}
