//! ChunkVault Core - chunked, content-verified object storage
//!
//! Files are split into fixed-size chunks spread round-robin over a fixed set
//! of storage nodes, each of which can be switched Online or Offline by an
//! operator. Every chunk and every file is fingerprinted with BLAKE3, so a
//! file read back from the live nodes is either byte-exact or reported with
//! the exact chunks that could not be recovered.

pub mod crypto;
pub mod events;
pub mod nodes;
pub mod storage;
mod vault;

pub use vault::{ChunkVault, DashboardSummary, SubmitReceipt};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for ChunkVault operations
#[derive(Error, Debug)]
pub enum ChunkVaultError {
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Node error: {0}")]
    Node(#[from] nodes::NodeError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChunkVaultError>;

/// Vault configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Root directory for node chunk areas, the index database and
    /// reconstructed outputs
    pub data_path: PathBuf,

    /// Maximum chunk length in bytes
    pub chunk_size: usize,

    /// Storage node population, in rotation order
    pub nodes: Vec<String>,

    /// Number of events kept for operators
    pub event_log_capacity: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./chunkvault_data"),
            chunk_size: 1024 * 1024, // 1 MiB
            nodes: (1..=5).map(|i| format!("node-{}", i)).collect(),
            event_log_capacity: 100,
        }
    }
}

impl VaultConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| ChunkVaultError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ChunkVaultError::Config("chunk_size must be greater than zero".into()));
        }
        if self.nodes.is_empty() {
            return Err(ChunkVaultError::Config("at least one node is required".into()));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            // ids double as directory names
            if node.is_empty()
                || node == "."
                || node == ".."
                || node.contains(|c: char| c == '/' || c == '\\')
            {
                return Err(ChunkVaultError::Config(format!("invalid node id {:?}", node)));
            }
            if !seen.insert(node.as_str()) {
                return Err(ChunkVaultError::Config(format!("duplicate node id {:?}", node)));
            }
        }

        Ok(())
    }
}

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`. Does nothing if a global subscriber is already set.
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
