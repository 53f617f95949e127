//! The vault facade consumed by transport and dashboard layers.

use crate::crypto::ContentHash;
use crate::events::{Event, EventLog};
use crate::nodes::{NodeId, NodeRegistry, NodeState, NodeStatus};
use crate::storage::{
    Catalog, ChunkStore, FileManifest, FileSummary, PlacementEngine, ReconstructionEngine,
    ReconstructionResult, ReconstructionStatus, RetrievalHandle,
};
use crate::{ChunkVaultError, Result, VaultConfig};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Returned to the uploader once a file is placed and catalogued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub file_id: String,
    pub total_chunks: u32,
}

/// Aggregate view for the operator dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub nodes: Vec<NodeState>,
    pub online_nodes: usize,
    pub total_files: usize,
    pub total_chunks: u64,
    /// Cumulative chunks assigned per node
    pub per_node_chunk_counts: BTreeMap<NodeId, u64>,
}

/// A chunked object store over a fixed set of storage nodes
pub struct ChunkVault {
    config: VaultConfig,
    _db: sled::Db,
    registry: Arc<NodeRegistry>,
    store: Arc<ChunkStore>,
    catalog: Arc<Catalog>,
    placement: PlacementEngine,
    reconstruction: ReconstructionEngine,
    events: EventLog,
}

impl ChunkVault {
    /// Open (or create) a vault under `config.data_path`
    pub async fn open(config: VaultConfig) -> Result<Self> {
        config.validate()?;
        let chunk_size = NonZeroUsize::new(config.chunk_size)
            .ok_or_else(|| ChunkVaultError::Config("chunk_size must be greater than zero".into()))?;

        tokio::fs::create_dir_all(&config.data_path).await?;

        let db = sled::open(config.data_path.join("index"))
            .map_err(|e| ChunkVaultError::Database(format!("Failed to open index: {}", e)))?;
        let nodes_tree = db
            .open_tree("nodes")
            .map_err(|e| ChunkVaultError::Database(e.to_string()))?;
        let catalog_tree = db
            .open_tree("catalog")
            .map_err(|e| ChunkVaultError::Database(e.to_string()))?;

        let population = config.nodes.iter().map(|id| NodeId::new(id.as_str())).collect();
        let registry = Arc::new(NodeRegistry::open(nodes_tree, population)?);
        let store = Arc::new(ChunkStore::open(config.data_path.clone()).await?);
        let catalog = Arc::new(Catalog::open(catalog_tree));

        let placement = PlacementEngine::new(registry.clone(), store.clone(), chunk_size);
        let reconstruction = ReconstructionEngine::new(
            registry.clone(),
            store.clone(),
            catalog.clone(),
            config.data_path.join("reconstructed"),
        );
        let events = EventLog::new(config.event_log_capacity);

        info!(
            path = ?config.data_path,
            nodes = config.nodes.len(),
            chunk_size = config.chunk_size,
            files = catalog.len(),
            "Vault opened"
        );

        Ok(Self {
            config,
            _db: db,
            registry,
            store,
            catalog,
            placement,
            reconstruction,
            events,
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Place a fully buffered upload and record its manifest.
    ///
    /// All-or-nothing: on any error no manifest is catalogued.
    pub async fn submit_file(&self, name: &str, data: &[u8]) -> Result<SubmitReceipt> {
        let file_id = Uuid::new_v4().to_string();

        let placed = async {
            let manifest = self.placement.place(&file_id, name, data).await?;
            self.catalog.put(&manifest).await?;
            Ok::<_, ChunkVaultError>(manifest)
        }
        .await;

        match placed {
            Ok(manifest) => {
                self.events.info(format!(
                    "Stored '{}' ({} bytes) as {} in {} chunks",
                    name, manifest.total_size, file_id, manifest.total_chunks
                ));
                Ok(SubmitReceipt {
                    file_id,
                    total_chunks: manifest.total_chunks,
                })
            }
            Err(e) => {
                self.events.error(format!("Upload of '{}' failed: {}", name, e));
                Err(e)
            }
        }
    }

    /// Read back and verify a stored file
    pub async fn request_reconstruction(&self, file_id: &str) -> Result<ReconstructionResult> {
        match self.reconstruction.reconstruct(file_id).await {
            Ok(result) => {
                match result.status {
                    ReconstructionStatus::Success => self.events.info(format!(
                        "Reconstructed {} ({} chunks)",
                        file_id, result.total_chunks
                    )),
                    ReconstructionStatus::Partial => self.events.warning(format!(
                        "Partial reconstruction of {}: {}/{} chunks available",
                        file_id, result.retrieved, result.total_chunks
                    )),
                    ReconstructionStatus::Failed => self.events.error(format!(
                        "Reconstruction of {} failed: no chunks available",
                        file_id
                    )),
                }
                Ok(result)
            }
            Err(e) => {
                self.events.error(format!("Reconstruction of {} failed: {}", file_id, e));
                Err(e.into())
            }
        }
    }

    /// Bytes of a reconstructed file, for the transport layer to serve
    pub async fn read_reconstructed(&self, handle: &RetrievalHandle) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&handle.path).await?)
    }

    pub fn list_nodes(&self) -> Vec<NodeState> {
        self.registry.list()
    }

    /// Operator control: switch a node Online or Offline
    pub fn set_node_status(&self, node_id: &NodeId, status: NodeStatus) -> Result<NodeState> {
        match self.registry.set_status(node_id, status) {
            Ok(state) => {
                match status {
                    NodeStatus::Online => self.events.info(format!("Node {} is online", node_id)),
                    NodeStatus::Offline => {
                        self.events.warning(format!("Node {} is offline", node_id))
                    }
                }
                Ok(state)
            }
            Err(e) => {
                self.events
                    .error(format!("Status change for node {} failed: {}", node_id, e));
                Err(e.into())
            }
        }
    }

    pub fn list_files(&self) -> Result<Vec<FileSummary>> {
        Ok(self.catalog.list()?.iter().map(FileManifest::summary).collect())
    }

    pub fn get_file(&self, file_id: &str) -> Result<FileManifest> {
        Ok(self.catalog.get(file_id)?)
    }

    /// Look up a stored file by its whole-file digest, given as hex or base58
    pub fn find_file_by_digest(&self, digest: &str) -> Result<Option<FileSummary>> {
        let digest = ContentHash::parse(digest)?;
        Ok(self
            .catalog
            .find_by_digest(&digest)?
            .map(|m| m.summary()))
    }

    pub fn dashboard_summary(&self) -> Result<DashboardSummary> {
        let nodes = self.registry.list();
        let manifests = self.catalog.list()?;

        Ok(DashboardSummary {
            online_nodes: nodes.iter().filter(|n| n.is_online()).count(),
            total_files: manifests.len(),
            total_chunks: manifests.iter().map(|m| m.total_chunks as u64).sum(),
            per_node_chunk_counts: nodes
                .iter()
                .map(|n| (n.id.clone(), n.chunk_count))
                .collect(),
            nodes,
        })
    }

    /// Most recent operator events, newest first
    pub fn recent_events(&self, limit: usize) -> Vec<Event> {
        self.events.recent(limit)
    }

    pub fn chunk_store(&self) -> &ChunkStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLevel;
    use crate::storage::{MissingReason, StorageError};
    use rand::RngCore;
    use tempfile::TempDir;

    fn config(dir: &TempDir, nodes: usize, chunk_size: usize) -> VaultConfig {
        VaultConfig {
            data_path: dir.path().to_path_buf(),
            chunk_size,
            nodes: (1..=nodes).map(|i| format!("node-{}", i)).collect(),
            event_log_capacity: 50,
        }
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    #[tokio::test]
    async fn test_round_trip_random_payloads() {
        let temp_dir = TempDir::new().unwrap();
        let vault = ChunkVault::open(config(&temp_dir, 4, 1000)).await.unwrap();

        for len in [0usize, 1, 999, 1000, 1001, 12_345] {
            let data = random_bytes(len);
            let receipt = vault.submit_file("payload.bin", &data).await.unwrap();
            assert_eq!(receipt.total_chunks as usize, len.div_ceil(1000));

            let result = vault.request_reconstruction(&receipt.file_id).await.unwrap();
            assert_eq!(result.status, ReconstructionStatus::Success);
            let bytes = vault.read_reconstructed(result.handle.as_ref().unwrap()).await.unwrap();
            assert_eq!(bytes, data);
        }
    }

    #[tokio::test]
    async fn test_offline_node_receives_no_new_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let vault = ChunkVault::open(config(&temp_dir, 3, 10)).await.unwrap();
        let offline = NodeId::new("node-2");

        vault.set_node_status(&offline, NodeStatus::Offline).unwrap();
        let receipt = vault.submit_file("a.txt", &random_bytes(95)).await.unwrap();

        let manifest = vault.get_file(&receipt.file_id).unwrap();
        assert_eq!(manifest.total_chunks, 10);
        assert!(manifest.chunks.values().all(|c| c.node_id != offline));
        assert_eq!(vault.registry.get_status(&offline).chunk_count, 0);
    }

    #[tokio::test]
    async fn test_liveness_round_trip_without_replacement() {
        let temp_dir = TempDir::new().unwrap();
        let vault = ChunkVault::open(config(&temp_dir, 3, 10)).await.unwrap();
        let data = random_bytes(60);
        let receipt = vault.submit_file("a.txt", &data).await.unwrap();
        let node = NodeId::new("node-1");

        vault.set_node_status(&node, NodeStatus::Offline).unwrap();
        let result = vault.request_reconstruction(&receipt.file_id).await.unwrap();
        assert_eq!(result.status, ReconstructionStatus::Partial);
        assert_eq!(result.missing.len(), 2);
        assert!(result.missing.iter().all(|m| m.reason == MissingReason::NodeOffline));

        vault.set_node_status(&node, NodeStatus::Online).unwrap();
        let result = vault.request_reconstruction(&receipt.file_id).await.unwrap();
        assert_eq!(result.status, ReconstructionStatus::Success);
        let bytes = vault.read_reconstructed(result.handle.as_ref().unwrap()).await.unwrap();
        assert_eq!(bytes, data);
    }

    #[tokio::test]
    async fn test_all_nodes_offline() {
        let temp_dir = TempDir::new().unwrap();
        let vault = ChunkVault::open(config(&temp_dir, 2, 10)).await.unwrap();
        let receipt = vault.submit_file("a.txt", &random_bytes(25)).await.unwrap();

        for node in ["node-1", "node-2"] {
            vault.set_node_status(&NodeId::new(node), NodeStatus::Offline).unwrap();
        }

        let result = vault.request_reconstruction(&receipt.file_id).await.unwrap();
        assert_eq!(result.status, ReconstructionStatus::Failed);
        assert_eq!(result.missing.len(), 3);
        assert!(result.handle.is_none());

        let upload = vault.submit_file("b.txt", b"more data").await;
        assert!(matches!(
            upload,
            Err(ChunkVaultError::Storage(StorageError::NoOnlineNodes { .. }))
        ));
        assert_eq!(vault.list_files().unwrap().len(), 1);
        assert_eq!(vault.recent_events(1)[0].level, EventLevel::Error);
    }

    #[tokio::test]
    async fn test_corrupted_chunk_reported() {
        let temp_dir = TempDir::new().unwrap();
        let vault = ChunkVault::open(config(&temp_dir, 3, 8)).await.unwrap();
        let receipt = vault.submit_file("a.txt", &random_bytes(40)).await.unwrap();
        let manifest = vault.get_file(&receipt.file_id).unwrap();

        let target = manifest.chunk(3).unwrap();
        let mut payload = vault
            .chunk_store()
            .get(&target.node_id, &receipt.file_id, 3)
            .await
            .unwrap();
        payload[0] ^= 0x01;
        vault
            .chunk_store()
            .put(&target.node_id, &receipt.file_id, 3, &payload)
            .await
            .unwrap();

        let result = vault.request_reconstruction(&receipt.file_id).await.unwrap();
        assert_eq!(result.status, ReconstructionStatus::Partial);
        assert_eq!(result.missing.len(), 1);
        assert_eq!(result.missing[0].chunk_index, 3);
        assert_eq!(result.missing[0].reason, MissingReason::IntegrityFailure);
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let temp_dir = TempDir::new().unwrap();
        let vault = ChunkVault::open(config(&temp_dir, 2, 8)).await.unwrap();

        assert!(matches!(
            vault.request_reconstruction("no-such-file").await,
            Err(ChunkVaultError::Storage(StorageError::FileNotFound(_)))
        ));
        assert!(matches!(
            vault.set_node_status(&NodeId::new("node-9"), NodeStatus::Offline),
            Err(ChunkVaultError::Node(_))
        ));
        assert!(matches!(
            vault.get_file("no-such-file"),
            Err(ChunkVaultError::Storage(StorageError::FileNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_find_file_by_digest() {
        let temp_dir = TempDir::new().unwrap();
        let vault = ChunkVault::open(config(&temp_dir, 2, 8)).await.unwrap();
        let data = b"find me by my digest";
        let receipt = vault.submit_file("digest.txt", data).await.unwrap();
        let digest = ContentHash::hash(data);

        let by_hex = vault.find_file_by_digest(&digest.to_hex()).unwrap().unwrap();
        let by_base58 = vault.find_file_by_digest(&digest.to_base58()).unwrap().unwrap();
        assert_eq!(by_hex.file_id, receipt.file_id);
        assert_eq!(by_base58.file_id, receipt.file_id);

        let other = ContentHash::hash(b"never stored");
        assert!(vault.find_file_by_digest(&other.to_hex()).unwrap().is_none());
        assert!(matches!(
            vault.find_file_by_digest("not a digest!"),
            Err(ChunkVaultError::Crypto(_))
        ));
    }

    #[tokio::test]
    async fn test_dashboard_summary() {
        let temp_dir = TempDir::new().unwrap();
        let vault = ChunkVault::open(config(&temp_dir, 3, 10)).await.unwrap();

        vault.submit_file("a.txt", &random_bytes(30)).await.unwrap();
        vault.submit_file("b.txt", &random_bytes(15)).await.unwrap();
        vault.set_node_status(&NodeId::new("node-3"), NodeStatus::Offline).unwrap();

        let summary = vault.dashboard_summary().unwrap();
        assert_eq!(summary.total_files, 2);
        assert_eq!(summary.total_chunks, 5);
        assert_eq!(summary.online_nodes, 2);
        assert_eq!(summary.nodes.len(), 3);
        assert_eq!(summary.per_node_chunk_counts.values().sum::<u64>(), 5);
        // 5 chunks rotate node-1, node-2, node-3, node-1, node-2
        assert_eq!(summary.per_node_chunk_counts[&NodeId::new("node-3")], 1);
    }

    #[tokio::test]
    async fn test_events_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let vault = ChunkVault::open(config(&temp_dir, 2, 10)).await.unwrap();

        let receipt = vault.submit_file("notes.md", b"hello").await.unwrap();
        vault.set_node_status(&NodeId::new("node-1"), NodeStatus::Offline).unwrap();
        vault.request_reconstruction(&receipt.file_id).await.unwrap();

        let events = vault.recent_events(10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].level, EventLevel::Error);
        assert_eq!(events[1].level, EventLevel::Warning);
        assert_eq!(events[2].level, EventLevel::Info);
        assert!(events[2].message.contains("notes.md"));
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let data = random_bytes(33);
        let file_id = {
            let vault = ChunkVault::open(config(&temp_dir, 3, 10)).await.unwrap();
            let receipt = vault.submit_file("keep.bin", &data).await.unwrap();
            vault.set_node_status(&NodeId::new("node-2"), NodeStatus::Offline).unwrap();
            receipt.file_id
        };

        let vault = ChunkVault::open(config(&temp_dir, 3, 10)).await.unwrap();
        let files = vault.list_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].original_name, "keep.bin");
        assert_eq!(files[0].mime_type, "application/octet-stream");

        let node2 = vault.registry.get_status(&NodeId::new("node-2"));
        assert_eq!(node2.status, NodeStatus::Offline);
        assert_eq!(node2.chunk_count, 1);

        vault.set_node_status(&NodeId::new("node-2"), NodeStatus::Online).unwrap();
        let result = vault.request_reconstruction(&file_id).await.unwrap();
        let bytes = vault.read_reconstructed(result.handle.as_ref().unwrap()).await.unwrap();
        assert_eq!(bytes, data);
    }
}
