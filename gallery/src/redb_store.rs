//! Redb-backed persistent identity store.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::GalleryError;
use crate::encoding::{decode_embedding, decode_embeddings, encode_embedding, encode_embeddings};
use crate::store::{EmbeddingStore, IdentityRecord, ListQuery};

/// name -> msgpack [`IdentityMeta`].
const IDENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("identities");
/// name -> packed per-image embeddings.
const EMBEDDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("embeddings");
/// name -> packed average embedding; empty for identities without a face.
const AVERAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("averages");

#[derive(Serialize, Deserialize)]
struct IdentityMeta {
    images: Vec<String>,
    dim: usize,
}

/// A persistent [`EmbeddingStore`] backed by redb.
///
/// Embeddings are kept as opaque little-endian f32 buffers in their own
/// tables so that [`EmbeddingStore::list_identities`] only touches the
/// averages. Every mutation is a single write transaction.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GalleryError> {
        let db = Database::create(path).map_err(GalleryError::store)?;

        // Create the tables if they don't exist.
        let tx = db.begin_write().map_err(GalleryError::store)?;
        {
            tx.open_table(IDENTITIES).map_err(GalleryError::store)?;
            tx.open_table(EMBEDDINGS).map_err(GalleryError::store)?;
            tx.open_table(AVERAGES).map_err(GalleryError::store)?;
        }
        tx.commit().map_err(GalleryError::store)?;

        Ok(Self { db })
    }

    fn encode_meta(record: &IdentityRecord) -> Result<Vec<u8>, GalleryError> {
        let meta = IdentityMeta {
            images: record.images.clone(),
            dim: record.embeddings.first().map_or(0, Vec::len),
        };
        rmp_serde::to_vec_named(&meta).map_err(|e| GalleryError::Serialization(e.to_string()))
    }

    fn decode_record(
        name: &str,
        meta: &[u8],
        embeddings: &[u8],
        average: &[u8],
    ) -> Result<IdentityRecord, GalleryError> {
        let meta: IdentityMeta =
            rmp_serde::from_slice(meta).map_err(|e| GalleryError::Serialization(e.to_string()))?;
        Ok(IdentityRecord {
            name: name.to_string(),
            images: meta.images,
            embeddings: decode_embeddings(embeddings, meta.dim)?,
            average: decode_embedding(average)?,
        })
    }
}

impl EmbeddingStore for RedbStore {
    fn list_identities(&self) -> Result<Vec<(String, Vec<f32>)>, GalleryError> {
        let tx = self.db.begin_read().map_err(GalleryError::store)?;
        let table = tx.open_table(AVERAGES).map_err(GalleryError::store)?;

        let mut results = Vec::new();
        for item in table.iter().map_err(GalleryError::store)? {
            let (key, value) = item.map_err(GalleryError::store)?;
            results.push((key.value().to_string(), decode_embedding(value.value())?));
        }
        Ok(results)
    }

    fn search(&self, query: &ListQuery) -> Result<Vec<IdentityRecord>, GalleryError> {
        let tx = self.db.begin_read().map_err(GalleryError::store)?;
        let ids = tx.open_table(IDENTITIES).map_err(GalleryError::store)?;
        let embs = tx.open_table(EMBEDDINGS).map_err(GalleryError::store)?;
        let avgs = tx.open_table(AVERAGES).map_err(GalleryError::store)?;

        let mut results = Vec::new();
        let mut skipped = 0;
        for item in ids.iter().map_err(GalleryError::store)? {
            if results.len() >= query.page_size() {
                break;
            }
            let (key, meta) = item.map_err(GalleryError::store)?;
            let name = key.value();
            if !query.matches(name) {
                continue;
            }
            if skipped < query.offset {
                skipped += 1;
                continue;
            }

            let emb = embs.get(name).map_err(GalleryError::store)?;
            let avg = avgs.get(name).map_err(GalleryError::store)?;
            results.push(Self::decode_record(
                name,
                meta.value(),
                emb.as_ref().map_or(&[][..], |g| g.value()),
                avg.as_ref().map_or(&[][..], |g| g.value()),
            )?);
        }
        Ok(results)
    }

    fn get(&self, name: &str) -> Result<Option<IdentityRecord>, GalleryError> {
        let tx = self.db.begin_read().map_err(GalleryError::store)?;
        let ids = tx.open_table(IDENTITIES).map_err(GalleryError::store)?;
        let Some(meta) = ids.get(name).map_err(GalleryError::store)? else {
            return Ok(None);
        };

        let embs = tx.open_table(EMBEDDINGS).map_err(GalleryError::store)?;
        let avgs = tx.open_table(AVERAGES).map_err(GalleryError::store)?;
        let emb = embs.get(name).map_err(GalleryError::store)?;
        let avg = avgs.get(name).map_err(GalleryError::store)?;

        Self::decode_record(
            name,
            meta.value(),
            emb.as_ref().map_or(&[][..], |g| g.value()),
            avg.as_ref().map_or(&[][..], |g| g.value()),
        )
        .map(Some)
    }

    fn put(&self, record: &IdentityRecord) -> Result<(), GalleryError> {
        let meta = Self::encode_meta(record)?;
        let emb = encode_embeddings(&record.embeddings);
        let avg = encode_embedding(&record.average);
        let name = record.name.as_str();

        let tx = self.db.begin_write().map_err(GalleryError::store)?;
        {
            let mut ids = tx.open_table(IDENTITIES).map_err(GalleryError::store)?;
            let mut embs = tx.open_table(EMBEDDINGS).map_err(GalleryError::store)?;
            let mut avgs = tx.open_table(AVERAGES).map_err(GalleryError::store)?;
            ids.insert(name, meta.as_slice()).map_err(GalleryError::store)?;
            embs.insert(name, emb.as_slice()).map_err(GalleryError::store)?;
            avgs.insert(name, avg.as_slice()).map_err(GalleryError::store)?;
        }
        tx.commit().map_err(GalleryError::store)?;
        Ok(())
    }

    fn replace(&self, old_name: &str, record: &IdentityRecord) -> Result<(), GalleryError> {
        let meta = Self::encode_meta(record)?;
        let emb = encode_embeddings(&record.embeddings);
        let avg = encode_embedding(&record.average);
        let name = record.name.as_str();

        let tx = self.db.begin_write().map_err(GalleryError::store)?;
        {
            let mut ids = tx.open_table(IDENTITIES).map_err(GalleryError::store)?;
            let mut embs = tx.open_table(EMBEDDINGS).map_err(GalleryError::store)?;
            let mut avgs = tx.open_table(AVERAGES).map_err(GalleryError::store)?;

            // Returning early drops the transaction uncommitted.
            if ids.get(old_name).map_err(GalleryError::store)?.is_none() {
                return Err(GalleryError::NotFound(old_name.to_string()));
            }
            if name != old_name && ids.get(name).map_err(GalleryError::store)?.is_some() {
                return Err(GalleryError::AlreadyExists(name.to_string()));
            }

            ids.remove(old_name).map_err(GalleryError::store)?;
            embs.remove(old_name).map_err(GalleryError::store)?;
            avgs.remove(old_name).map_err(GalleryError::store)?;
            ids.insert(name, meta.as_slice()).map_err(GalleryError::store)?;
            embs.insert(name, emb.as_slice()).map_err(GalleryError::store)?;
            avgs.insert(name, avg.as_slice()).map_err(GalleryError::store)?;
        }
        tx.commit().map_err(GalleryError::store)?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool, GalleryError> {
        let tx = self.db.begin_write().map_err(GalleryError::store)?;
        let existed;
        {
            let mut ids = tx.open_table(IDENTITIES).map_err(GalleryError::store)?;
            let mut embs = tx.open_table(EMBEDDINGS).map_err(GalleryError::store)?;
            let mut avgs = tx.open_table(AVERAGES).map_err(GalleryError::store)?;
            existed = ids.remove(name).map_err(GalleryError::store)?.is_some();
            embs.remove(name).map_err(GalleryError::store)?;
            avgs.remove(name).map_err(GalleryError::store)?;
        }
        tx.commit().map_err(GalleryError::store)?;
        Ok(existed)
    }

    fn clear(&self) -> Result<(), GalleryError> {
        let tx = self.db.begin_write().map_err(GalleryError::store)?;
        for def in [IDENTITIES, EMBEDDINGS, AVERAGES] {
            let mut table = tx.open_table(def).map_err(GalleryError::store)?;
            let mut keys = Vec::new();
            for item in table.iter().map_err(GalleryError::store)? {
                let (key, _) = item.map_err(GalleryError::store)?;
                keys.push(key.value().to_string());
            }
            for key in &keys {
                table.remove(key.as_str()).map_err(GalleryError::store)?;
            }
        }
        tx.commit().map_err(GalleryError::store)?;
        Ok(())
    }

    fn len(&self) -> Result<usize, GalleryError> {
        let tx = self.db.begin_read().map_err(GalleryError::store)?;
        let table = tx.open_table(IDENTITIES).map_err(GalleryError::store)?;
        let mut n = 0;
        for item in table.iter().map_err(GalleryError::store)? {
            item.map_err(GalleryError::store)?;
            n += 1;
        }
        Ok(n)
    }
}
