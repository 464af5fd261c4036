use facerec_vecstore::{FlatIndex, Hnsw, HnswConfig, SlotIndex};
use serde::{Deserialize, Serialize};

use crate::GalleryError;

/// Default embedding dimension of the face model.
pub const DEFAULT_DIM: usize = 512;

/// Default number of candidates returned per face.
pub const DEFAULT_TOP_K: usize = 10;

/// Which [`SlotIndex`] implementation backs the gallery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Exact brute-force scan.
    #[default]
    Flat,
    /// Approximate HNSW graph.
    Hnsw,
}

/// HNSW tuning knobs. Zero means "use the default".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
        }
    }
}

/// Controls gallery behavior.
///
/// Every field has a default, so a partial JSON document such as
/// `{"index": "hnsw"}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Embedding dimension produced by the extractor.
    pub dim: usize,

    /// Candidates returned per face when the caller does not say.
    pub top_k: usize,

    /// Faces kept per image during enrollment. Images usually show one
    /// person, so extra detections are noise.
    pub max_faces_per_image: usize,

    pub index: IndexKind,

    pub hnsw: HnswParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dim: DEFAULT_DIM,
            top_k: DEFAULT_TOP_K,
            max_faces_per_image: 1,
            index: IndexKind::default(),
            hnsw: HnswParams::default(),
        }
    }
}

impl Config {
    /// Replaces zero values with defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.dim == 0 {
            self.dim = DEFAULT_DIM;
        }
        if self.top_k == 0 {
            self.top_k = DEFAULT_TOP_K;
        }
        if self.max_faces_per_image == 0 {
            self.max_faces_per_image = 1;
        }
        self
    }

    /// Parses a JSON configuration document.
    pub fn from_json(s: &str) -> Result<Self, GalleryError> {
        let cfg: Config =
            serde_json::from_str(s).map_err(|e| GalleryError::Serialization(e.to_string()))?;
        Ok(cfg.with_defaults())
    }

    /// Builds an empty index of the configured kind.
    pub fn build_index(&self) -> Box<dyn SlotIndex> {
        match self.index {
            IndexKind::Flat => Box::new(FlatIndex::new(self.dim)),
            IndexKind::Hnsw => Box::new(Hnsw::new(HnswConfig {
                dim: self.dim,
                m: self.hnsw.m,
                ef_construction: self.hnsw.ef_construction,
                ef_search: self.hnsw.ef_search,
            })),
        }
    }
}
