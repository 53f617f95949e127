//! Storage Module - chunk placement, catalog and reconstruction
//!
//! Files are split into fixed-size chunks, each written to exactly one live
//! node. The catalog records where every chunk went and what it hashed to, so
//! a file can be read back from whichever nodes are live and verified
//! byte-for-byte.

mod catalog;
mod chunk_store;
mod manifest;
mod placement;
mod reconstruction;

pub use catalog::Catalog;
pub use chunk_store::ChunkStore;
pub use manifest::{chunk_count, ChunkRecord, FileManifest, FileSummary};
pub use placement::PlacementEngine;
pub use reconstruction::{
    MissingChunk, MissingReason, ReconstructionEngine, ReconstructionResult,
    ReconstructionStatus, RetrievalHandle,
};

use crate::crypto::ContentHash;
use crate::nodes::{NodeError, NodeId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Chunk {chunk_index} of file {file_id} not found on node {node_id}")]
    ChunkNotFound {
        node_id: NodeId,
        file_id: String,
        chunk_index: u32,
    },

    #[error("Node {node_id} unavailable for chunk {chunk_index} of file {file_id}")]
    NodeUnavailable {
        node_id: NodeId,
        file_id: String,
        chunk_index: u32,
    },

    #[error("No online nodes to place chunk {chunk_index} of file {file_id}")]
    NoOnlineNodes { file_id: String, chunk_index: u32 },

    #[error("File {file_id} needs {chunks} chunks, more than a manifest can index")]
    TooManyChunks { file_id: String, chunks: usize },

    #[error("File {file_id} failed whole-file verification: expected {expected}, got {actual}")]
    FileIntegrityFailure {
        file_id: String,
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("Invalid manifest for file {file_id}: {reason}")]
    InvalidManifest { file_id: String, reason: String },

    #[error("Catalog database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Node registry error: {0}")]
    Node(#[from] NodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
