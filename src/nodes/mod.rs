//! Node Registry - the fixed storage-node population and its liveness
//!
//! Nodes are configured once at startup and never added or removed while the
//! process runs. Each node carries an operator-controlled Online/Offline flag
//! and a cumulative count of chunks ever assigned to it.

mod registry;

pub use registry::NodeRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Node database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Identifier of a storage node from the configured population
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Liveness flag, flipped only by an explicit operator action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Online,
    Offline,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Online => f.write_str("online"),
            NodeStatus::Offline => f.write_str("offline"),
        }
    }
}

/// Mutable per-node record owned by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub id: NodeId,

    pub status: NodeStatus,

    /// Chunks ever assigned to this node. Never decremented, so it reflects
    /// assignment history rather than what is currently readable.
    pub chunk_count: u64,

    /// Time of the last operator status change
    pub last_seen: Option<DateTime<Utc>>,
}

impl NodeState {
    /// Fresh record for a node joining the population
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            status: NodeStatus::Online,
            chunk_count: 0,
            last_seen: None,
        }
    }

    /// Stand-in returned for ids the registry has no record of
    pub fn unknown(id: NodeId) -> Self {
        Self {
            id,
            status: NodeStatus::Offline,
            chunk_count: 0,
            last_seen: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }
}
