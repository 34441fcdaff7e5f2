// src/store/backend.rs

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::debug;
use uuid::Uuid;

use crate::errors::Result;
use crate::store::ModelHash;

/// Durable byte storage keyed by model hash.
///
/// Writes must be idempotent: putting bytes under a hash that already exists
/// leaves the existing entry untouched.
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `hash`. Returns `false` if the entry already existed.
    fn put(&self, hash: &ModelHash, bytes: &[u8]) -> Result<bool>;
    fn get(&self, hash: &ModelHash) -> Result<Option<Vec<u8>>>;
    fn contains(&self, hash: &ModelHash) -> Result<bool>;
    /// Number of physical entries.
    fn len(&self) -> Result<usize>;
}

/// Gzipped N-Triples files sharded by hash prefix:
/// `<root>/<hash[0..2]>/<hash[2..]>.nt.gz`.
///
/// New blobs are written to `<root>/tmp/<uuid>` first and then renamed into
/// place, so readers never see a partially written entry.
pub struct FsBlobStore {
    root: PathBuf,
}

const TEMP_DIR: &str = "tmp";
const BLOB_EXTENSION: &str = ".nt.gz";

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &ModelHash) -> PathBuf {
        let (prefix, rest) = hash.shard();
        self.root.join(prefix).join(format!("{rest}{BLOB_EXTENSION}"))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, hash: &ModelHash, bytes: &[u8]) -> Result<bool> {
        let target = self.blob_path(hash);
        if target.exists() {
            return Ok(false);
        }

        let temp_dir = self.root.join(TEMP_DIR);
        fs::create_dir_all(&temp_dir)
            .with_context(|| format!("creating temp directory at {:?}", temp_dir))?;
        let temp = temp_dir.join(Uuid::new_v4().to_string());

        {
            let file = File::create(&temp)
                .with_context(|| format!("creating temp blob at {:?}", temp))?;
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            encoder.write_all(bytes)?;
            encoder.finish()?.flush()?;
        }

        if target.exists() {
            // A concurrent writer got there first with identical content.
            fs::remove_file(&temp)?;
            return Ok(false);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating shard directory at {:?}", parent))?;
        }
        fs::rename(&temp, &target)
            .with_context(|| format!("moving blob into place at {:?}", target))?;
        debug!(hash = %hash, path = ?target, "wrote model blob");
        Ok(true)
    }

    fn get(&self, hash: &ModelHash) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(hash);
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path).with_context(|| format!("opening blob at {:?}", path))?;
        let mut bytes = Vec::new();
        GzDecoder::new(file)
            .read_to_end(&mut bytes)
            .with_context(|| format!("decompressing blob at {:?}", path))?;
        Ok(Some(bytes))
    }

    fn contains(&self, hash: &ModelHash) -> Result<bool> {
        Ok(self.blob_path(hash).exists())
    }

    fn len(&self) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut count = 0;
        for shard in fs::read_dir(&self.root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() || shard.file_name() == TEMP_DIR {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                if entry.file_name().to_string_lossy().ends_with(BLOB_EXTENSION) {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

/// Keeps blobs in memory only (lost on restart).
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<ModelHash, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, hash: &ModelHash, bytes: &[u8]) -> Result<bool> {
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        if blobs.contains_key(hash) {
            return Ok(false);
        }
        blobs.insert(hash.clone(), bytes.to_vec());
        Ok(true)
    }

    fn get(&self, hash: &ModelHash) -> Result<Option<Vec<u8>>> {
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.get(hash).cloned())
    }

    fn contains(&self, hash: &ModelHash) -> Result<bool> {
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.contains_key(hash))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.blobs.lock().unwrap_or_else(PoisonError::into_inner).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_store_shards_and_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let hash = ModelHash::of(b"<urn:a> <urn:p> <urn:b> .\n");

        assert!(store.put(&hash, b"<urn:a> <urn:p> <urn:b> .\n").unwrap());
        assert!(!store.put(&hash, b"<urn:a> <urn:p> <urn:b> .\n").unwrap());

        let (prefix, rest) = hash.shard();
        assert!(dir.path().join(prefix).join(format!("{rest}.nt.gz")).is_file());
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(
            store.get(&hash).unwrap().as_deref(),
            Some(&b"<urn:a> <urn:p> <urn:b> .\n"[..])
        );
    }

    #[test]
    fn fs_store_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let hash = ModelHash::of(b"x");
        store.put(&hash, b"x").unwrap();
        store.put(&hash, b"x").unwrap();

        let temp_entries = fs::read_dir(dir.path().join(TEMP_DIR)).unwrap().count();
        assert_eq!(temp_entries, 0);
    }

    #[test]
    fn missing_blob_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("never-created"));
        assert_eq!(store.get(&ModelHash::of(b"nope")).unwrap(), None);
        assert_eq!(store.len().unwrap(), 0);

        let memory = MemoryBlobStore::new();
        assert!(!memory.contains(&ModelHash::of(b"nope")).unwrap());
    }
}
