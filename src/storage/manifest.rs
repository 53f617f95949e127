//! File manifests - the placement and integrity record of one file

use crate::crypto::ContentHash;
use crate::nodes::NodeId;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Number of chunks a payload of `len` bytes splits into
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size)
}

/// Where one chunk lives and what it hashed to. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub file_id: String,

    /// Position in the file (0-based)
    pub chunk_index: u32,

    /// The single node holding this chunk
    pub node_id: NodeId,

    /// Content hash for verification
    pub digest: ContentHash,

    pub byte_length: u64,
}

/// Complete record for one stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    pub file_id: String,

    /// Name supplied at upload
    pub original_name: String,

    /// MIME type guessed from the original name
    pub mime_type: String,

    pub total_size: u64,

    pub total_chunks: u32,

    /// Content hash of the whole file
    pub file_digest: ContentHash,

    pub uploaded_at: DateTime<Utc>,

    /// Chunk records keyed by index
    pub chunks: BTreeMap<u32, ChunkRecord>,
}

impl FileManifest {
    pub fn chunk(&self, index: u32) -> Option<&ChunkRecord> {
        self.chunks.get(&index)
    }

    /// Check the manifest invariants: exactly `total_chunks` records indexed
    /// `0..total_chunks`, each tagged with this file, lengths summing to
    /// `total_size`.
    pub fn check_complete(&self) -> Result<(), String> {
        if self.chunks.len() != self.total_chunks as usize {
            return Err(format!(
                "expected {} chunk records, found {}",
                self.total_chunks,
                self.chunks.len()
            ));
        }

        for (expected, (index, record)) in (0u32..).zip(&self.chunks) {
            if *index != expected || record.chunk_index != *index {
                return Err(format!("chunk index {} out of sequence", index));
            }
            if record.file_id != self.file_id {
                return Err(format!("chunk {} belongs to file {}", index, record.file_id));
            }
        }

        let sum: u64 = self.chunks.values().map(|c| c.byte_length).sum();
        if sum != self.total_size {
            return Err(format!(
                "chunk lengths sum to {}, file size is {}",
                sum, self.total_size
            ));
        }

        Ok(())
    }

    /// Distinct nodes holding at least one chunk of this file
    pub fn nodes_used(&self) -> BTreeSet<&NodeId> {
        self.chunks.values().map(|c| &c.node_id).collect()
    }

    pub fn summary(&self) -> FileSummary {
        FileSummary {
            file_id: self.file_id.clone(),
            original_name: self.original_name.clone(),
            mime_type: self.mime_type.clone(),
            total_size: self.total_size,
            total_chunks: self.total_chunks,
            file_digest: self.file_digest.to_hex(),
            uploaded_at: self.uploaded_at,
        }
    }
}

/// Listing view of a manifest without per-chunk detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub file_id: String,
    pub original_name: String,
    pub mime_type: String,
    pub total_size: u64,
    pub total_chunks: u32,
    pub file_digest: String,
    pub uploaded_at: DateTime<Utc>,
}
