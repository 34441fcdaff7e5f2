// src/store/mod.rs

//! Content-addressed model storage.
//!
//! - [`hash`] defines [`ModelHash`], the blake3 content address.
//! - [`backend`] holds the durable byte stores (sharded gzip files or memory).
//!
//! [`ModelStore`] sits on top of a backend and keeps a cache of weak
//! references, so a graph stays shared while any [`Model`] still holds it and
//! is transparently reloaded from the backend afterwards.

pub mod backend;
pub mod hash;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use oxrdf::Graph;
use tracing::{debug, info};

use crate::errors::{KbflowError, Result};
use crate::model::Model;
use crate::types::StorageMode;

pub use backend::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use hash::{InvalidModelHash, ModelHash};

/// Directory (below the store path) holding model blobs.
pub const MODELS_DIR: &str = "models";

pub struct ModelStore {
    backend: Arc<dyn BlobStore>,
    cache: Mutex<HashMap<ModelHash, Weak<Graph>>>,
}

impl ModelStore {
    pub fn new(backend: Arc<dyn BlobStore>) -> Self {
        Self {
            backend,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBlobStore::new()))
    }

    /// Open the store for the given storage mode rooted at `root`.
    pub fn open(mode: StorageMode, root: &Path) -> Self {
        match mode {
            StorageMode::File => Self::new(Arc::new(FsBlobStore::new(root.join(MODELS_DIR)))),
            StorageMode::Memory => Self::in_memory(),
        }
    }

    /// Persist a model and return its content address.
    ///
    /// Saving a model whose canonical form is already stored is a no-op
    /// apart from refreshing the cache entry.
    pub fn save(&self, model: &Model) -> Result<ModelHash> {
        let bytes = model.canonical_bytes();
        let hash = ModelHash::of(&bytes);

        if self.backend.put(&hash, &bytes)? {
            info!(hash = %hash, triples = model.len(), "stored model");
        } else {
            debug!(hash = %hash, "model already stored");
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, graph| graph.strong_count() > 0);
        cache.insert(hash.clone(), Arc::downgrade(model.shared()));
        Ok(hash)
    }

    /// Load a model by hash, preferring a still-live cached graph.
    pub fn get(&self, hash: &ModelHash) -> Result<Model> {
        if let Some(graph) = self.cached(hash) {
            debug!(hash = %hash, "model cache hit");
            return Ok(Model::from_shared(graph));
        }

        let bytes = self
            .backend
            .get(hash)?
            .ok_or_else(|| KbflowError::ModelNotFound(hash.clone()))?;
        let model = Model::parse_ntriples(&bytes)?;
        debug!(hash = %hash, triples = model.len(), "loaded model from backend");

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        // Another reader may have loaded it meanwhile; keep whichever is live.
        if let Some(graph) = cache.get(hash).and_then(Weak::upgrade) {
            return Ok(Model::from_shared(graph));
        }
        cache.insert(hash.clone(), Arc::downgrade(model.shared()));
        Ok(model)
    }

    pub fn contains(&self, hash: &ModelHash) -> Result<bool> {
        self.backend.contains(hash)
    }

    /// Number of physically stored entries.
    pub fn physical_len(&self) -> Result<usize> {
        self.backend.len()
    }

    /// Number of cache entries whose graph is still alive.
    pub fn live_cache_entries(&self) -> usize {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.values().filter(|graph| graph.strong_count() > 0).count()
    }

    fn cached(&self, hash: &ModelHash) -> Option<Arc<Graph>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(hash).and_then(Weak::upgrade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{Literal, NamedNode, Triple};

    fn sample() -> Model {
        Model::from_triples([Triple::new(
            NamedNode::new_unchecked("urn:a"),
            NamedNode::new_unchecked("urn:label"),
            Literal::new_simple_literal("alpha"),
        )])
    }

    #[test]
    fn cache_shares_live_graphs() {
        let store = ModelStore::in_memory();
        let model = sample();
        let hash = store.save(&model).unwrap();

        let loaded = store.get(&hash).unwrap();
        assert!(Arc::ptr_eq(model.shared(), loaded.shared()));
    }

    #[test]
    fn dropped_models_are_reloaded_from_backend() {
        let store = ModelStore::in_memory();
        let hash = store.save(&sample()).unwrap();
        assert_eq!(store.live_cache_entries(), 0);

        let loaded = store.get(&hash).unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(store.live_cache_entries(), 1);
    }

    #[test]
    fn unknown_hash_is_an_error() {
        let store = ModelStore::in_memory();
        let err = store.get(&ModelHash::of(b"missing")).unwrap_err();
        assert!(matches!(err, KbflowError::ModelNotFound(_)));
    }
}
