//! Reconstruction Engine - reads a file back from whichever nodes are live
//!
//! Every chunk is fetched from its single owning node and verified against
//! the digest recorded at placement. Chunks that cannot be fetched or fail
//! verification are reported as missing rather than failing the call; only a
//! fully retrieved file is reassembled, checked against the whole-file digest
//! and written out for download.

use super::{Catalog, ChunkRecord, ChunkStore, FileManifest, StorageError};
use crate::crypto::{ContentHash, IncrementalHasher};
use crate::nodes::{NodeId, NodeRegistry};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Overall outcome of a reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconstructionStatus {
    /// Every chunk retrieved and verified, output written
    Success,
    /// Some but not all chunks retrieved
    Partial,
    /// No chunk retrieved
    Failed,
}

/// Why a chunk could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingReason {
    /// Owning node is Offline
    NodeOffline,
    /// Owning node is Online but the payload could not be read
    ChunkReadFailure,
    /// Payload was read but its digest did not match the manifest
    IntegrityFailure,
}

impl fmt::Display for MissingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingReason::NodeOffline => f.write_str("node offline"),
            MissingReason::ChunkReadFailure => f.write_str("chunk read failure"),
            MissingReason::IntegrityFailure => f.write_str("integrity failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingChunk {
    pub chunk_index: u32,
    pub node_id: NodeId,
    pub reason: MissingReason,
}

/// Location of a verified, reassembled file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalHandle {
    pub file_id: String,
    pub original_name: String,
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionResult {
    pub file_id: String,
    pub status: ReconstructionStatus,
    pub total_chunks: u32,
    pub retrieved: u32,
    /// Unusable chunks in index order
    pub missing: Vec<MissingChunk>,
    /// Present only on `Success`
    pub handle: Option<RetrievalHandle>,
}

impl ReconstructionResult {
    pub fn is_success(&self) -> bool {
        self.status == ReconstructionStatus::Success
    }
}

pub struct ReconstructionEngine {
    registry: Arc<NodeRegistry>,
    store: Arc<ChunkStore>,
    catalog: Arc<Catalog>,
    /// Directory receiving reassembled files
    output_dir: PathBuf,
}

impl ReconstructionEngine {
    pub fn new(
        registry: Arc<NodeRegistry>,
        store: Arc<ChunkStore>,
        catalog: Arc<Catalog>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            store,
            catalog,
            output_dir,
        }
    }

    /// Read back, verify and reassemble `file_id`.
    ///
    /// Per-chunk problems degrade the status and never fail the call. Errors
    /// are reserved for an unknown or malformed manifest, a whole-file digest
    /// mismatch and failures writing the output. Concurrent calls for the
    /// same file are allowed; each replaces the output atomically.
    pub async fn reconstruct(&self, file_id: &str) -> Result<ReconstructionResult, StorageError> {
        let manifest = self.catalog.get(file_id)?;

        let fetches = manifest.chunks.values().map(|record| self.fetch_chunk(record));
        let outcomes = join_all(fetches).await;

        let mut chunks = Vec::with_capacity(outcomes.len());
        let mut missing = Vec::new();
        let mut retrieved: u32 = 0;
        for outcome in outcomes {
            match outcome {
                Ok(data) => {
                    chunks.push(data);
                    retrieved += 1;
                }
                Err(chunk) => missing.push(chunk),
            }
        }

        let status = if missing.is_empty() {
            ReconstructionStatus::Success
        } else if retrieved > 0 {
            ReconstructionStatus::Partial
        } else {
            ReconstructionStatus::Failed
        };

        let handle = match status {
            ReconstructionStatus::Success => Some(self.assemble(&manifest, &chunks).await?),
            _ => {
                warn!(
                    file_id,
                    retrieved,
                    total = manifest.total_chunks,
                    ?status,
                    "Reconstruction incomplete"
                );
                None
            }
        };

        Ok(ReconstructionResult {
            file_id: file_id.to_string(),
            status,
            total_chunks: manifest.total_chunks,
            retrieved,
            missing,
            handle,
        })
    }

    async fn fetch_chunk(&self, record: &ChunkRecord) -> Result<Vec<u8>, MissingChunk> {
        let missing = |reason| MissingChunk {
            chunk_index: record.chunk_index,
            node_id: record.node_id.clone(),
            reason,
        };

        if !self.registry.is_online(&record.node_id) {
            debug!(file_id = %record.file_id, chunk_index = record.chunk_index, node = %record.node_id, "Owner offline");
            return Err(missing(MissingReason::NodeOffline));
        }

        let data = match self
            .store
            .get(&record.node_id, &record.file_id, record.chunk_index)
            .await
        {
            Ok(data) => data,
            Err(e) => {
                warn!(file_id = %record.file_id, chunk_index = record.chunk_index, node = %record.node_id, error = %e, "Chunk read failed");
                return Err(missing(MissingReason::ChunkReadFailure));
            }
        };

        if !record.digest.verify(&data) {
            warn!(file_id = %record.file_id, chunk_index = record.chunk_index, node = %record.node_id, "Chunk digest mismatch");
            return Err(missing(MissingReason::IntegrityFailure));
        }

        Ok(data)
    }

    /// Concatenate verified chunks, check the whole-file digest and write
    /// the result to the output directory.
    async fn assemble(
        &self,
        manifest: &FileManifest,
        chunks: &[Vec<u8>],
    ) -> Result<RetrievalHandle, StorageError> {
        let mut hasher = IncrementalHasher::new();
        let mut output = Vec::with_capacity(manifest.total_size as usize);
        for chunk in chunks {
            hasher.update(chunk);
            output.extend_from_slice(chunk);
        }

        let size = hasher.bytes_processed();

        // Unreachable while per-chunk verification holds; kept as an invariant check.
        let actual: ContentHash = hasher.finalize();
        if actual != manifest.file_digest {
            return Err(StorageError::FileIntegrityFailure {
                file_id: manifest.file_id.clone(),
                expected: manifest.file_digest,
                actual,
            });
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(&manifest.file_id);
        // one temp file per call
        let temp_path = self
            .output_dir
            .join(format!("{}.{}.tmp", manifest.file_id, Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&output).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, &path).await?;

        info!(file_id = %manifest.file_id, bytes = size, "File reconstructed");

        Ok(RetrievalHandle {
            file_id: manifest.file_id.clone(),
            original_name: manifest.original_name.clone(),
            path,
            size,
        })
    }
}
