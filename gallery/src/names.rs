use std::collections::HashMap;

use crate::GalleryError;

/// Parallel slot → name table with an explicit name → slot map.
///
/// `names[slot]` is the name last assigned to that slot, kept even after
/// the slot is soft-deleted. The map resolves each name to at most one
/// slot; a name whose slot was taken over by a rename no longer resolves
/// to the old slot.
#[derive(Debug, Default)]
pub(crate) struct NameTable {
    names: Vec<String>,
    slots: HashMap<String, usize>,
}

impl NameTable {
    /// Builds a table where `names[i]` owns slot `i`.
    pub(crate) fn from_names(names: Vec<String>) -> Result<Self, GalleryError> {
        let mut slots = HashMap::with_capacity(names.len());
        for (slot, name) in names.iter().enumerate() {
            if slots.insert(name.clone(), slot).is_some() {
                return Err(GalleryError::DuplicateName(name.clone()));
            }
        }
        Ok(Self { names, slots })
    }

    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }

    pub(crate) fn slot_of(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    pub(crate) fn name_of(&self, slot: usize) -> Option<&str> {
        self.names.get(slot).map(String::as_str)
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }

    /// Appends `name` at the next slot and returns that slot.
    pub(crate) fn push(&mut self, name: &str) -> usize {
        let slot = self.names.len();
        self.names.push(name.to_string());
        self.slots.insert(name.to_string(), slot);
        slot
    }

    /// Points `slot` at `new_name`. Any other slot previously resolved by
    /// `new_name` stops resolving.
    pub(crate) fn rename(&mut self, slot: usize, new_name: &str) {
        let old = std::mem::replace(&mut self.names[slot], new_name.to_string());
        if self.slots.get(&old) == Some(&slot) {
            self.slots.remove(&old);
        }
        self.slots.insert(new_name.to_string(), slot);
    }

    pub(crate) fn clear(&mut self) {
        self.names.clear();
        self.slots.clear();
    }
}
