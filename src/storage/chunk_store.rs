//! Per-node chunk persistence on the local filesystem
//!
//! Each node owns a directory; a chunk is one file keyed by
//! (node, file id, chunk index):
//!
//! ```text
//! {root}/nodes/{node_id}/{file_id}/{chunk_index:06}.chunk
//! ```
//!
//! The store does not consult liveness. Whether a node may receive or serve
//! a chunk is decided by the caller; the store only moves bytes.

use super::StorageError;
use crate::nodes::NodeId;

use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

pub struct ChunkStore {
    /// Base path for node directories
    root: PathBuf,
}

impl ChunkStore {
    /// Open the store rooted at `root`, creating the node area if needed
    pub async fn open(root: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(root.join("nodes")).await?;
        debug!("Initialized chunk store at {:?}", root);
        Ok(Self { root })
    }

    /// Location of the payload for a given key
    pub fn chunk_path(&self, node_id: &NodeId, file_id: &str, chunk_index: u32) -> PathBuf {
        self.root
            .join("nodes")
            .join(node_id.as_str())
            .join(file_id)
            .join(format!("{:06}.chunk", chunk_index))
    }

    /// Write a chunk payload.
    ///
    /// Written to a temp file and renamed into place, so a reader sees either
    /// the previous payload or the complete new one. Re-writing a key
    /// replaces its payload.
    pub async fn put(
        &self,
        node_id: &NodeId,
        file_id: &str,
        chunk_index: u32,
        data: &[u8],
    ) -> Result<(), StorageError> {
        let path = self.chunk_path(node_id, file_id, chunk_index);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, &path).await?;

        trace!(node = %node_id, file_id, chunk_index, bytes = data.len(), "Stored chunk");
        Ok(())
    }

    /// Read a chunk payload
    pub async fn get(
        &self,
        node_id: &NodeId,
        file_id: &str,
        chunk_index: u32,
    ) -> Result<Vec<u8>, StorageError> {
        let path = self.chunk_path(node_id, file_id, chunk_index);

        match fs::read(&path).await {
            Ok(data) => {
                trace!(node = %node_id, file_id, chunk_index, bytes = data.len(), "Read chunk");
                Ok(data)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::ChunkNotFound {
                node_id: node_id.clone(),
                file_id: file_id.to_string(),
                chunk_index,
            }),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Whether a payload exists for the key. Failures to inspect the path
    /// are reported, not read as absence.
    pub async fn contains(
        &self,
        node_id: &NodeId,
        file_id: &str,
        chunk_index: u32,
    ) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.chunk_path(node_id, file_id, chunk_index)).await?)
    }
}
