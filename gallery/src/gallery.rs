use std::sync::Arc;

use facerec_vecstore::VecError;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::GalleryError;
use crate::config::Config;
use crate::extractor::{EmbeddingExtractor, Face, ImageInput};
use crate::matches::FaceMatches;
use crate::store::{EmbeddingStore, IdentityRecord, ListQuery};
use crate::sync::IndexSynchronizer;

/// Changes applied by [`Gallery::update`]. `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct IdentityUpdate {
    /// New name for the identity.
    pub name: Option<String>,

    /// Replaces every image and embedding.
    pub images: Option<Vec<ImageInput>>,

    /// Appended to the existing images. Ignored when `images` is set.
    pub new_image: Option<ImageInput>,
}

/// Result of [`Gallery::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The identity did not exist and was enrolled.
    Created(IdentityRecord),
    Updated(IdentityRecord),
}

impl UpdateOutcome {
    pub fn record(&self) -> &IdentityRecord {
        match self {
            Self::Created(r) | Self::Updated(r) => r,
        }
    }

    pub fn into_record(self) -> IdentityRecord {
        match self {
            Self::Created(r) | Self::Updated(r) => r,
        }
    }
}

/// Image references and embeddings taken from a batch of images.
struct Extracted {
    refs: Vec<String>,
    embeddings: Vec<Vec<f32>>,
}

enum ImageChange {
    Keep,
    Replace(Extracted),
    Append(Extracted),
}

/// A face gallery: enrolls identities, keeps the store and the vector index
/// consistent, and identifies faces in probe images.
///
/// Each mutation extracts embeddings first, then, holding the writer lock,
/// re-reads the identity, commits to the store and updates the index.
/// Writers are serialized so the index always sees changes in store commit
/// order; queries only take the index lock. If the process dies between the
/// commit and the index update, the next [`Gallery::open`] rebuilds the
/// index from the store.
///
/// Share one `Gallery` between request handlers through an `Arc`.
pub struct Gallery {
    cfg: Config,
    store: Arc<dyn EmbeddingStore>,
    extractor: Arc<dyn EmbeddingExtractor>,
    sync: IndexSynchronizer,
    writer: Mutex<()>,
}

impl Gallery {
    /// Builds the configured index and loads it from `store`.
    pub fn open(
        cfg: Config,
        store: Arc<dyn EmbeddingStore>,
        extractor: Arc<dyn EmbeddingExtractor>,
    ) -> Result<Self, GalleryError> {
        let cfg = cfg.with_defaults();
        if extractor.dimension() != cfg.dim {
            return Err(GalleryError::DimensionMismatch {
                expected: cfg.dim,
                got: extractor.dimension(),
            });
        }

        let sync = IndexSynchronizer::new(cfg.build_index());
        sync.initialize(store.as_ref())?;
        Ok(Self {
            cfg,
            store,
            extractor,
            sync,
            writer: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn synchronizer(&self) -> &IndexSynchronizer {
        &self.sync
    }

    /// Enrolls a new identity from one or more images.
    ///
    /// Images without a detectable face are dropped. If none has a face the
    /// identity is still stored, but cannot be matched until it gains one.
    pub fn enroll(
        &self,
        name: &str,
        images: &[ImageInput],
    ) -> Result<IdentityRecord, GalleryError> {
        let extracted = self.extract_all(images)?;

        let _writer = self.writer.lock();
        if self.store.get(name)?.is_some() {
            return Err(GalleryError::AlreadyExists(name.to_string()));
        }
        self.create_locked(name, extracted)
    }

    /// Applies renames and image changes to `name`, enrolling it if it does
    /// not exist yet.
    pub fn update(
        &self,
        name: &str,
        update: IdentityUpdate,
    ) -> Result<UpdateOutcome, GalleryError> {
        self.apply(name, update, true)
    }

    /// Adds one image to an existing identity. An image without a face
    /// leaves the identity unchanged.
    pub fn add_image(&self, name: &str, image: ImageInput) -> Result<IdentityRecord, GalleryError> {
        let update = IdentityUpdate {
            new_image: Some(image),
            ..Default::default()
        };
        self.apply(name, update, false).map(UpdateOutcome::into_record)
    }

    /// Replaces all images of an existing identity.
    pub fn replace_images(
        &self,
        name: &str,
        images: Vec<ImageInput>,
    ) -> Result<IdentityRecord, GalleryError> {
        let update = IdentityUpdate {
            images: Some(images),
            ..Default::default()
        };
        self.apply(name, update, false).map(UpdateOutcome::into_record)
    }

    /// Renames an existing identity. Its index slot is unchanged.
    pub fn rename(&self, name: &str, new_name: &str) -> Result<IdentityRecord, GalleryError> {
        let update = IdentityUpdate {
            name: Some(new_name.to_string()),
            ..Default::default()
        };
        self.apply(name, update, false).map(UpdateOutcome::into_record)
    }

    /// Deletes an identity. Its slot is soft-deleted, not freed.
    pub fn remove(&self, name: &str) -> Result<(), GalleryError> {
        let _writer = self.writer.lock();
        if !self.store.delete(name)? {
            return Err(GalleryError::NotFound(name.to_string()));
        }
        let slot = self.sync.on_delete(name)?;
        info!(name, slot = ?slot, "gallery: identity removed");
        Ok(())
    }

    /// Deletes every identity and resets the index.
    pub fn remove_all(&self) -> Result<(), GalleryError> {
        let _writer = self.writer.lock();
        self.store.clear()?;
        self.sync.on_delete_all()?;
        Ok(())
    }

    /// Finds every face in `image` and ranks up to `k` candidate identities
    /// for each (default [`Config::top_k`]).
    pub fn identify(
        &self,
        image: &[u8],
        k: Option<usize>,
    ) -> Result<Vec<FaceMatches>, GalleryError> {
        let faces = self.extractor.extract(image)?;
        for face in &faces {
            self.check_face(face)?;
        }
        if faces.is_empty() {
            debug!("gallery: no face in probe image");
            return Ok(Vec::new());
        }

        let (boxes, probes): (Vec<[f32; 4]>, Vec<Vec<f32>>) =
            faces.into_iter().map(|f| (f.bbox, f.embedding)).unzip();
        let results = self.sync.query_many(&probes, k.unwrap_or(self.cfg.top_k))?;

        Ok(boxes
            .into_iter()
            .zip(results)
            .map(|(bbox, matches)| FaceMatches::new(Some(bbox), matches))
            .collect())
    }

    /// Like [`Gallery::identify`] for embeddings that were already extracted.
    pub fn identify_embeddings(
        &self,
        probes: &[Vec<f32>],
        k: Option<usize>,
    ) -> Result<Vec<FaceMatches>, GalleryError> {
        let results = self.sync.query_many(probes, k.unwrap_or(self.cfg.top_k))?;
        Ok(results
            .into_iter()
            .map(|matches| FaceMatches::new(None, matches))
            .collect())
    }

    pub fn get(&self, name: &str) -> Result<Option<IdentityRecord>, GalleryError> {
        self.store.get(name)
    }

    /// Lists identities in store order, filtered and paged by `query`.
    pub fn list(&self, query: &ListQuery) -> Result<Vec<IdentityRecord>, GalleryError> {
        self.store.search(query)
    }

    fn apply(
        &self,
        name: &str,
        update: IdentityUpdate,
        create_missing: bool,
    ) -> Result<UpdateOutcome, GalleryError> {
        let change = match (&update.images, &update.new_image) {
            (Some(images), _) => ImageChange::Replace(self.extract_all(images)?),
            (None, Some(image)) => {
                ImageChange::Append(self.extract_all(std::slice::from_ref(image))?)
            }
            (None, None) => ImageChange::Keep,
        };
        let target = update.name.as_deref().unwrap_or(name);

        let _writer = self.writer.lock();
        if target != name && self.store.get(target)?.is_some() {
            return Err(GalleryError::AlreadyExists(target.to_string()));
        }

        let Some(mut record) = self.store.get(name)? else {
            if !create_missing {
                return Err(GalleryError::NotFound(name.to_string()));
            }
            let extracted = match change {
                ImageChange::Replace(e) | ImageChange::Append(e) => e,
                ImageChange::Keep => Extracted {
                    refs: Vec::new(),
                    embeddings: Vec::new(),
                },
            };
            return self.create_locked(target, extracted).map(UpdateOutcome::Created);
        };

        match change {
            ImageChange::Keep => {}
            ImageChange::Replace(e) => {
                record.images = e.refs;
                record.embeddings = e.embeddings;
            }
            ImageChange::Append(e) => {
                record.images.extend(e.refs);
                record.embeddings.extend(e.embeddings);
            }
        }
        record.name = target.to_string();
        record.refresh_average()?;

        self.store.replace(name, &record)?;
        let slot = self.sync.on_update(name, target, &record.average)?;

        info!(
            name,
            new_name = target,
            images = record.images.len(),
            slot = ?slot,
            "gallery: identity updated"
        );
        Ok(UpdateOutcome::Updated(record))
    }

    /// Stores and indexes a new identity. The writer lock must be held.
    fn create_locked(
        &self,
        name: &str,
        extracted: Extracted,
    ) -> Result<IdentityRecord, GalleryError> {
        let record = IdentityRecord::new(name, extracted.refs, extracted.embeddings)?;
        self.store.put(&record)?;
        let slot = self.sync.on_create(name, &record.average)?;

        info!(
            name,
            images = record.images.len(),
            slot = ?slot,
            "gallery: identity enrolled"
        );
        Ok(record)
    }

    /// Extracts up to `max_faces_per_image` embeddings per image, keeping
    /// references only for images that yielded a face.
    fn extract_all(&self, images: &[ImageInput]) -> Result<Extracted, GalleryError> {
        let mut refs = Vec::with_capacity(images.len());
        let mut embeddings = Vec::with_capacity(images.len());

        for image in images {
            let faces = self.extractor.extract(&image.data)?;
            if faces.is_empty() {
                debug!(image = %image.reference, "gallery: no face found, image skipped");
                continue;
            }
            for face in faces.into_iter().take(self.cfg.max_faces_per_image) {
                self.check_face(&face)?;
                embeddings.push(face.embedding);
            }
            refs.push(image.reference.clone());
        }
        Ok(Extracted { refs, embeddings })
    }

    /// Rejects embeddings the index would refuse, before anything is
    /// committed to the store.
    fn check_face(&self, face: &Face) -> Result<(), GalleryError> {
        if face.embedding.len() != self.cfg.dim {
            return Err(GalleryError::DimensionMismatch {
                expected: self.cfg.dim,
                got: face.embedding.len(),
            });
        }
        if let Some(index) = face.embedding.iter().position(|x| !x.is_finite()) {
            return Err(VecError::NonFinite { index }.into());
        }
        Ok(())
    }
}
