//! Placement Engine - splits a payload into chunks and assigns each to a node
//!
//! Assignment is round-robin over the node population, skipping nodes that
//! are Offline. The rotation cursor is owned by the engine and shared across
//! calls, so consecutive uploads continue the rotation instead of restarting
//! it at the first node.

use super::{ChunkRecord, ChunkStore, FileManifest, StorageError};
use crate::crypto::ContentHash;
use crate::nodes::{NodeId, NodeRegistry};

use futures::future::try_join_all;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info};

pub struct PlacementEngine {
    registry: Arc<NodeRegistry>,

    store: Arc<ChunkStore>,

    /// Maximum chunk length in bytes
    chunk_size: NonZeroUsize,

    /// Population slot where the next scan starts
    cursor: Mutex<usize>,
}

impl PlacementEngine {
    pub fn new(registry: Arc<NodeRegistry>, store: Arc<ChunkStore>, chunk_size: NonZeroUsize) -> Self {
        Self {
            registry,
            store,
            chunk_size,
            cursor: Mutex::new(0),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.get()
    }

    /// Split `data` into chunks, write each to its assigned node and return
    /// the completed manifest.
    ///
    /// Nothing is recorded in the catalog here; the caller inserts the
    /// manifest once this returns. On error no manifest exists, though chunk
    /// payloads already written stay on disk unreferenced.
    pub async fn place(
        &self,
        file_id: &str,
        original_name: &str,
        data: &[u8],
    ) -> Result<FileManifest, StorageError> {
        let total_chunks = indexed_chunk_count(file_id, data.len(), self.chunk_size.get())?;
        let assignments = self.assign(file_id, total_chunks)?;

        self.write_assigned(file_id, original_name, data, &assignments).await
    }

    /// Write each chunk of `data` to the node assigned to it and build the
    /// manifest. Any node that went offline after assignment aborts the call
    /// before chunk counts are touched.
    async fn write_assigned(
        &self,
        file_id: &str,
        original_name: &str,
        data: &[u8],
        assignments: &[NodeId],
    ) -> Result<FileManifest, StorageError> {
        let total_chunks = indexed_chunk_count(file_id, data.len(), self.chunk_size.get())?;
        let file_digest = ContentHash::hash(data);

        let writes = (0u32..)
            .zip(data.chunks(self.chunk_size.get()).zip(assignments))
            .map(|(index, (chunk, node_id))| self.write_chunk(file_id, index, node_id, chunk));
        let records = try_join_all(writes).await?;

        for record in &records {
            self.registry.increment_chunk_count(&record.node_id)?;
        }

        let mime_type = mime_guess::from_path(original_name)
            .first_or_octet_stream()
            .to_string();

        let manifest = FileManifest {
            file_id: file_id.to_string(),
            original_name: original_name.to_string(),
            mime_type,
            total_size: data.len() as u64,
            total_chunks,
            file_digest,
            uploaded_at: chrono::Utc::now(),
            chunks: records
                .into_iter()
                .map(|record| (record.chunk_index, record))
                .collect::<BTreeMap<_, _>>(),
        };

        info!(
            file_id,
            name = original_name,
            size = manifest.total_size,
            chunks = manifest.total_chunks,
            digest = %manifest.file_digest,
            "Placed file"
        );
        Ok(manifest)
    }

    /// Choose a node for each of `count` chunks.
    ///
    /// The cursor lock is held for the whole call so concurrent placements
    /// never take the same rotation slot. The advanced cursor is only stored
    /// once every chunk has a node; a failed call leaves the rotation where
    /// it was.
    fn assign(&self, file_id: &str, count: u32) -> Result<Vec<NodeId>, StorageError> {
        let population = self.registry.population();
        let mut cursor = self.cursor.lock();
        let mut next = *cursor;
        let mut assignments = Vec::with_capacity(count as usize);

        for chunk_index in 0..count {
            let slot = (0..population.len())
                .map(|step| (next + step) % population.len())
                .find(|&slot| self.registry.is_online(&population[slot]))
                .ok_or_else(|| StorageError::NoOnlineNodes {
                    file_id: file_id.to_string(),
                    chunk_index,
                })?;

            assignments.push(population[slot].clone());
            next = (slot + 1) % population.len();
        }

        *cursor = next;
        Ok(assignments)
    }

    async fn write_chunk(
        &self,
        file_id: &str,
        chunk_index: u32,
        node_id: &NodeId,
        chunk: &[u8],
    ) -> Result<ChunkRecord, StorageError> {
        if !self.registry.is_online(node_id) {
            return Err(StorageError::NodeUnavailable {
                node_id: node_id.clone(),
                file_id: file_id.to_string(),
                chunk_index,
            });
        }

        let digest = ContentHash::hash(chunk);
        self.store.put(node_id, file_id, chunk_index, chunk).await?;
        debug!(file_id, chunk_index, node = %node_id, bytes = chunk.len(), "Chunk placed");

        Ok(ChunkRecord {
            file_id: file_id.to_string(),
            chunk_index,
            node_id: node_id.clone(),
            digest,
            byte_length: chunk.len() as u64,
        })
    }
}

/// Number of chunks `len` bytes split into, as a manifest index
fn indexed_chunk_count(file_id: &str, len: usize, chunk_size: usize) -> Result<u32, StorageError> {
    let chunks = super::chunk_count(len, chunk_size);
    u32::try_from(chunks).map_err(|_| StorageError::TooManyChunks {
        file_id: file_id.to_string(),
        chunks,
    })
}
