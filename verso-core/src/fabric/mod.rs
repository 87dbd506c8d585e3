//! Partition fabric: version-scoped storage units and the node-local
//! replica attachments through which they are read and written.
//!
//! The fabric is assumed to provide durable, replicated storage for
//! individual entries on its own; this module defines the boundary the
//! rollout protocol needs from it, plus an in-process implementation
//! for tests and single-process deployments.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::version::VersionTag;

pub use memory::{FabricBackbone, MemoryFabric};

/// Node-local handle to a replica of one version's partition.
///
/// Handles are call-scoped: obtain one, use it, let it go. They are
/// never cached across discovery calls, so a node that detached a
/// replica in the meantime simply hands out a fresh handle (or a fault)
/// on the next lookup instead of serving through a stale attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaHandle {
    pub tag: VersionTag,
    /// Identifier of the local attachment, unique per node.
    pub partition_id: String,
}

/// One record of the dataset, opaque to the fabric.
#[derive(Debug, Clone)]
pub struct DatasetEntry {
    pub key: String,
    pub value: Bytes,
}

impl DatasetEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Trait for partition fabric implementations.
#[async_trait]
pub trait PartitionFabric: Send + Sync {
    /// Look up the local replica for `tag`. Cheap and node-local; no
    /// network round trip.
    async fn find_local(&self, tag: &VersionTag) -> Result<Option<ReplicaHandle>>;

    /// Create a brand-new local replica for `tag`.
    ///
    /// Not idempotent: if a replica for this tag already exists locally,
    /// including one created a moment ago by a concurrent caller, the
    /// call fails with `VersoError::ReplicaExists`. First writer wins;
    /// losers resolve by re-running `find_local`.
    async fn create_replica(&self, tag: &VersionTag) -> Result<ReplicaHandle>;

    /// Detach the local replica for `tag`. Partition data is never
    /// deleted by a detach; other nodes' replicas are unaffected.
    async fn drop_replica(&self, tag: &VersionTag) -> Result<()>;

    /// All replicas currently attached on this node.
    async fn list_local(&self) -> Result<Vec<ReplicaHandle>>;

    /// Write a batch of entries through a locally attached replica.
    async fn write_batch(&self, handle: &ReplicaHandle, entries: Vec<DatasetEntry>) -> Result<()>;

    /// Read one entry through a locally attached replica.
    async fn get(&self, handle: &ReplicaHandle, key: &str) -> Result<Option<Bytes>>;

    /// Number of entries in the partition behind `handle`.
    async fn entry_count(&self, handle: &ReplicaHandle) -> Result<u64>;
}

/// Type alias for dynamic fabric
pub type DynPartitionFabric = dyn PartitionFabric;
