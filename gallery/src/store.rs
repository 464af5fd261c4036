use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::GalleryError;
use crate::average::average;

/// One enrolled person.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Unique display name; the primary key.
    pub name: String,

    /// References to the source images that yielded a face, in order.
    pub images: Vec<String>,

    /// Per-image face embeddings.
    pub embeddings: Vec<Vec<f32>>,

    /// Mean of `embeddings`, or empty when there are none.
    pub average: Vec<f32>,
}

impl IdentityRecord {
    /// Builds a record and computes its average embedding.
    pub fn new(
        name: impl Into<String>,
        images: Vec<String>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, GalleryError> {
        let average = average(&embeddings)?;
        Ok(Self {
            name: name.into(),
            images,
            embeddings,
            average,
        })
    }

    /// Recomputes `average` after `embeddings` changed.
    pub fn refresh_average(&mut self) -> Result<(), GalleryError> {
        self.average = average(&self.embeddings)?;
        Ok(())
    }

    /// True if the identity can be matched by a query.
    pub fn has_embedding(&self) -> bool {
        !self.average.is_empty()
    }
}

/// Selects a page of identities by name, in store order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Keep only names containing this substring (case-sensitive).
    pub name: Option<String>,

    /// Matching records to skip.
    pub offset: usize,

    /// Maximum records returned; `None` returns all.
    pub limit: Option<usize>,
}

impl ListQuery {
    /// Names containing `part`.
    pub fn name_contains(part: impl Into<String>) -> Self {
        Self {
            name: Some(part.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name.as_deref().is_none_or(|part| name.contains(part))
    }

    pub fn page_size(&self) -> usize {
        self.limit.unwrap_or(usize::MAX)
    }
}

/// System of record for identities and their embeddings.
///
/// The index is rebuilt from [`EmbeddingStore::list_identities`] on start,
/// and every gallery mutation is committed here before the index hears of
/// it. Implementations must be safe for concurrent use.
pub trait EmbeddingStore: Send + Sync {
    /// Every identity's name and average embedding, in a stable order.
    /// Identities without faces carry an empty vector.
    fn list_identities(&self) -> Result<Vec<(String, Vec<f32>)>, GalleryError>;

    /// Records selected by `query`, in the same order as
    /// `list_identities`.
    fn search(&self, query: &ListQuery) -> Result<Vec<IdentityRecord>, GalleryError>;

    fn get(&self, name: &str) -> Result<Option<IdentityRecord>, GalleryError>;

    /// Inserts or overwrites the record keyed by `record.name`.
    fn put(&self, record: &IdentityRecord) -> Result<(), GalleryError>;

    /// Atomically removes `old_name` and writes `record` under its own
    /// name. Fails with [`GalleryError::AlreadyExists`] if the new name
    /// belongs to another identity and [`GalleryError::NotFound`] if
    /// `old_name` is missing.
    fn replace(&self, old_name: &str, record: &IdentityRecord) -> Result<(), GalleryError>;

    /// Removes an identity. Returns false if it did not exist.
    fn delete(&self, name: &str) -> Result<bool, GalleryError>;

    fn clear(&self) -> Result<(), GalleryError>;

    fn len(&self) -> Result<usize, GalleryError>;

    fn is_empty(&self) -> Result<bool, GalleryError> {
        Ok(self.len()? == 0)
    }

    /// All records in the same order as `list_identities`.
    fn records(&self) -> Result<Vec<IdentityRecord>, GalleryError> {
        self.search(&ListQuery::default())
    }

    /// Renames an identity, keeping its images and embeddings.
    fn rename(&self, old_name: &str, new_name: &str) -> Result<IdentityRecord, GalleryError> {
        let mut record = self
            .get(old_name)?
            .ok_or_else(|| GalleryError::NotFound(old_name.to_string()))?;
        record.name = new_name.to_string();
        self.replace(old_name, &record)?;
        Ok(record)
    }
}

/// In-memory [`EmbeddingStore`] ordered by name.
/// Data is lost on restart. Suitable for testing or ephemeral use.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, IdentityRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EmbeddingStore for MemoryStore {
    fn list_identities(&self) -> Result<Vec<(String, Vec<f32>)>, GalleryError> {
        let records = self.records.lock();
        Ok(records
            .values()
            .map(|r| (r.name.clone(), r.average.clone()))
            .collect())
    }

    fn search(&self, query: &ListQuery) -> Result<Vec<IdentityRecord>, GalleryError> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|r| query.matches(&r.name))
            .skip(query.offset)
            .take(query.page_size())
            .cloned()
            .collect())
    }

    fn get(&self, name: &str) -> Result<Option<IdentityRecord>, GalleryError> {
        Ok(self.records.lock().get(name).cloned())
    }

    fn put(&self, record: &IdentityRecord) -> Result<(), GalleryError> {
        self.records
            .lock()
            .insert(record.name.clone(), record.clone());
        Ok(())
    }

    fn replace(&self, old_name: &str, record: &IdentityRecord) -> Result<(), GalleryError> {
        let mut records = self.records.lock();
        if !records.contains_key(old_name) {
            return Err(GalleryError::NotFound(old_name.to_string()));
        }
        if record.name != old_name && records.contains_key(&record.name) {
            return Err(GalleryError::AlreadyExists(record.name.clone()));
        }
        records.remove(old_name);
        records.insert(record.name.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool, GalleryError> {
        Ok(self.records.lock().remove(name).is_some())
    }

    fn clear(&self) -> Result<(), GalleryError> {
        self.records.lock().clear();
        Ok(())
    }

    fn len(&self) -> Result<usize, GalleryError> {
        Ok(self.records.lock().len())
    }
}
