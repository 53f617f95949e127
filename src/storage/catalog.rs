//! Durable fileId -> manifest index backed by sled.
//!
//! A manifest is stored as a single value, so inserting it is atomic: readers
//! observe either no manifest or the complete one. Manifests are checked
//! against the completeness invariant both when written and when read back.

use super::{FileManifest, StorageError};
use crate::crypto::ContentHash;

use tracing::debug;

pub struct Catalog {
    tree: sled::Tree,
}

impl Catalog {
    pub fn open(tree: sled::Tree) -> Self {
        Self { tree }
    }

    /// Look up the manifest of `file_id`
    pub fn get(&self, file_id: &str) -> Result<FileManifest, StorageError> {
        let bytes = self
            .tree
            .get(file_id.as_bytes())
            .map_err(|e| StorageError::Database(e.to_string()))?
            .ok_or_else(|| StorageError::FileNotFound(file_id.to_string()))?;

        decode(&bytes)
    }

    /// Insert or replace a manifest.
    ///
    /// Manifests that break the completeness invariant are rejected before
    /// anything is written.
    pub async fn put(&self, manifest: &FileManifest) -> Result<(), StorageError> {
        validate(manifest)?;

        let encoded =
            bincode::serialize(manifest).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.tree
            .insert(manifest.file_id.as_bytes(), encoded)
            .map_err(|e| StorageError::Database(e.to_string()))?;
        self.tree
            .flush_async()
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        debug!(file_id = %manifest.file_id, chunks = manifest.total_chunks, "Stored manifest");
        Ok(())
    }

    pub fn contains(&self, file_id: &str) -> Result<bool, StorageError> {
        self.tree
            .contains_key(file_id.as_bytes())
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// All manifests, oldest upload first
    pub fn list(&self) -> Result<Vec<FileManifest>, StorageError> {
        let mut manifests = Vec::with_capacity(self.tree.len());

        for item in self.tree.iter() {
            let (_, value) = item.map_err(|e| StorageError::Database(e.to_string()))?;
            manifests.push(decode(&value)?);
        }

        manifests.sort_by(|a, b| {
            a.uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.file_id.cmp(&b.file_id))
        });
        Ok(manifests)
    }

    /// First manifest (oldest upload) whose whole-file digest is `digest`
    pub fn find_by_digest(&self, digest: &ContentHash) -> Result<Option<FileManifest>, StorageError> {
        Ok(self
            .list()?
            .into_iter()
            .find(|m| m.file_digest == *digest))
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

fn decode(bytes: &[u8]) -> Result<FileManifest, StorageError> {
    let manifest: FileManifest =
        bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
    validate(&manifest)?;
    Ok(manifest)
}

fn validate(manifest: &FileManifest) -> Result<(), StorageError> {
    manifest
        .check_complete()
        .map_err(|reason| StorageError::InvalidManifest {
            file_id: manifest.file_id.clone(),
            reason,
        })
}
