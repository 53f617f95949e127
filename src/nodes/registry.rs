//! Registry of node states, persisted one record per node.

use super::{NodeError, NodeId, NodeState, NodeStatus};

use dashmap::DashMap;
use tracing::{debug, info};

/// Tracks liveness and assignment counts for the fixed node population.
///
/// Each state lives in its own map entry; an update holds that entry's write
/// guard across read, persist and store, so two updates to the same node
/// never interleave while updates to different nodes proceed independently.
pub struct NodeRegistry {
    /// Population in configured order (also the placement rotation order)
    population: Vec<NodeId>,

    states: DashMap<NodeId, NodeState>,

    /// Durable per-node records
    tree: sled::Tree,
}

impl NodeRegistry {
    /// Open the registry over `tree`, restoring persisted states and
    /// initialising any configured node without a record as Online.
    pub fn open(tree: sled::Tree, population: Vec<NodeId>) -> Result<Self, NodeError> {
        let states = DashMap::with_capacity(population.len());

        for id in &population {
            let state = match tree
                .get(id.as_str())
                .map_err(|e| NodeError::Database(e.to_string()))?
            {
                Some(bytes) => bincode::deserialize::<NodeState>(&bytes)
                    .map_err(|e| NodeError::Serialization(e.to_string()))?,
                None => {
                    let state = NodeState::new(id.clone());
                    persist(&tree, &state)?;
                    state
                }
            };
            debug!(node = %id, status = %state.status, chunks = state.chunk_count, "Loaded node state");
            states.insert(id.clone(), state);
        }

        info!(nodes = population.len(), "Node registry ready");

        Ok(Self {
            population,
            states,
            tree,
        })
    }

    /// Current state of `id`.
    ///
    /// Ids outside the population are not an error: they read as an Offline
    /// node with no chunks, which placement and reconstruction both treat as
    /// unusable.
    pub fn get_status(&self, id: &NodeId) -> NodeState {
        self.states
            .get(id)
            .map(|s| s.value().clone())
            .unwrap_or_else(|| NodeState::unknown(id.clone()))
    }

    pub fn is_online(&self, id: &NodeId) -> bool {
        self.states.get(id).map(|s| s.is_online()).unwrap_or(false)
    }

    /// Set the liveness flag of `id` and stamp `last_seen`.
    ///
    /// Unconditional and idempotent; the chunk count is left untouched.
    pub fn set_status(&self, id: &NodeId, status: NodeStatus) -> Result<NodeState, NodeError> {
        let mut entry = self
            .states
            .get_mut(id)
            .ok_or_else(|| NodeError::UnknownNode(id.clone()))?;

        let mut updated = entry.value().clone();
        updated.status = status;
        updated.last_seen = Some(chrono::Utc::now());
        persist(&self.tree, &updated)?;
        *entry = updated.clone();

        info!(node = %id, %status, "Node status changed");
        Ok(updated)
    }

    /// Record one more chunk assigned to `id`
    pub fn increment_chunk_count(&self, id: &NodeId) -> Result<(), NodeError> {
        let mut entry = self
            .states
            .get_mut(id)
            .ok_or_else(|| NodeError::UnknownNode(id.clone()))?;

        let mut updated = entry.value().clone();
        updated.chunk_count += 1;
        persist(&self.tree, &updated)?;
        *entry = updated;

        Ok(())
    }

    /// Node ids in configured order
    pub fn population(&self) -> &[NodeId] {
        &self.population
    }

    /// Snapshot of every node state in configured order
    pub fn list(&self) -> Vec<NodeState> {
        self.population.iter().map(|id| self.get_status(id)).collect()
    }

    pub fn online_nodes(&self) -> Vec<NodeId> {
        self.population
            .iter()
            .filter(|id| self.is_online(id))
            .cloned()
            .collect()
    }
}

fn persist(tree: &sled::Tree, state: &NodeState) -> Result<(), NodeError> {
    let encoded = bincode::serialize(state).map_err(|e| NodeError::Serialization(e.to_string()))?;
    tree.insert(state.id.as_str(), encoded)
        .map_err(|e| NodeError::Database(e.to_string()))?;
    // a status change is acknowledged only once it is on disk
    tree.flush().map_err(|e| NodeError::Database(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn population() -> Vec<NodeId> {
        vec!["node-1".into(), "node-2".into(), "node-3".into()]
    }

    fn temp_tree() -> (sled::Db, sled::Tree) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let tree = db.open_tree("nodes").unwrap();
        (db, tree)
    }

    #[test]
    fn test_initial_states_online() {
        let (_db, tree) = temp_tree();
        let registry = NodeRegistry::open(tree, population()).unwrap();

        let states = registry.list();
        assert_eq!(states.len(), 3);
        assert!(states.iter().all(|s| s.is_online()));
        assert!(states.iter().all(|s| s.chunk_count == 0 && s.last_seen.is_none()));
        assert_eq!(registry.online_nodes(), population());
    }

    #[test]
    fn test_unknown_node_reads_offline() {
        let (_db, tree) = temp_tree();
        let registry = NodeRegistry::open(tree, population()).unwrap();

        let ghost = NodeId::new("node-99");
        let state = registry.get_status(&ghost);
        assert_eq!(state.status, NodeStatus::Offline);
        assert_eq!(state.chunk_count, 0);
        assert!(!registry.is_online(&ghost));
    }

    #[test]
    fn test_set_status_unknown_node_fails() {
        let (_db, tree) = temp_tree();
        let registry = NodeRegistry::open(tree, population()).unwrap();

        let result = registry.set_status(&NodeId::new("node-99"), NodeStatus::Offline);
        assert!(matches!(result, Err(NodeError::UnknownNode(id)) if id.as_str() == "node-99"));
    }

    #[test]
    fn test_set_status_is_idempotent_and_keeps_count() {
        let (_db, tree) = temp_tree();
        let registry = NodeRegistry::open(tree, population()).unwrap();
        let node = NodeId::new("node-2");

        registry.increment_chunk_count(&node).unwrap();
        registry.increment_chunk_count(&node).unwrap();

        let first = registry.set_status(&node, NodeStatus::Offline).unwrap();
        let second = registry.set_status(&node, NodeStatus::Offline).unwrap();

        assert_eq!(first.status, NodeStatus::Offline);
        assert_eq!(second.status, NodeStatus::Offline);
        assert_eq!(second.chunk_count, 2);
        assert!(second.last_seen.is_some());
        assert_eq!(registry.online_nodes().len(), 2);
    }

    #[test]
    fn test_state_survives_reopen() {
        let (db, tree) = temp_tree();
        let node = NodeId::new("node-3");
        {
            let registry = NodeRegistry::open(tree.clone(), population()).unwrap();
            registry.set_status(&node, NodeStatus::Offline).unwrap();
            registry.increment_chunk_count(&node).unwrap();
        }

        let registry = NodeRegistry::open(db.open_tree("nodes").unwrap(), population()).unwrap();
        let state = registry.get_status(&node);
        assert_eq!(state.status, NodeStatus::Offline);
        assert_eq!(state.chunk_count, 1);
    }

    #[test]
    fn test_updates_are_durable_when_acknowledged() {
        let (_db, tree) = temp_tree();
        let registry = NodeRegistry::open(tree.clone(), population()).unwrap();
        let node = NodeId::new("node-1");

        registry.set_status(&node, NodeStatus::Offline).unwrap();
        registry.increment_chunk_count(&node).unwrap();

        let stored: NodeState =
            bincode::deserialize(&tree.get(node.as_str()).unwrap().unwrap()).unwrap();
        assert_eq!(stored.status, NodeStatus::Offline);
        assert_eq!(stored.chunk_count, 1);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let (_db, tree) = temp_tree();
        let registry = std::sync::Arc::new(NodeRegistry::open(tree, population()).unwrap());
        let node = NodeId::new("node-1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let node = node.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        registry.increment_chunk_count(&node).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.get_status(&node).chunk_count, 200);
    }
}
