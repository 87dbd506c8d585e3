use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::error::{Result, VersoError};
use crate::fabric::{DatasetEntry, PartitionFabric, ReplicaHandle};
use crate::version::VersionTag;

/// Cluster-wide side of the in-process fabric.
///
/// Holds every partition ever created, keyed by version tag. Multiple
/// `MemoryFabric` node views may share one backbone, which is how
/// multi-node behavior is exercised in a single process: entries
/// written through one node's replica are visible to every node that
/// joins the same tag. Detaching a replica never removes the partition,
/// so retired versions stay readable for nodes still attached.
pub struct FabricBackbone {
    partitions: RwLock<HashMap<VersionTag, Arc<Partition>>>,
}

struct Partition {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl FabricBackbone {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            partitions: RwLock::new(HashMap::new()),
        })
    }

    async fn ensure_partition(&self, tag: &VersionTag) -> Arc<Partition> {
        let mut partitions = self.partitions.write().await;
        partitions
            .entry(tag.clone())
            .or_insert_with(|| {
                Arc::new(Partition {
                    entries: RwLock::new(HashMap::new()),
                })
            })
            .clone()
    }

    async fn partition(&self, tag: &VersionTag) -> Option<Arc<Partition>> {
        let partitions = self.partitions.read().await;
        partitions.get(tag).cloned()
    }

    /// Number of partitions the backbone knows about, attached or not.
    pub async fn partition_count(&self) -> usize {
        self.partitions.read().await.len()
    }
}

/// One node's view of the fabric.
///
/// The attachment table is the node-local replica set; `create_replica`
/// is the single non-idempotent primitive, serialized on the table lock
/// so exactly one of any group of concurrent creators for a tag wins.
pub struct MemoryFabric {
    node_id: String,
    backbone: Arc<FabricBackbone>,
    attached: RwLock<HashMap<VersionTag, ReplicaHandle>>,
}

impl MemoryFabric {
    pub fn new(node_id: &str, backbone: Arc<FabricBackbone>) -> Self {
        Self {
            node_id: node_id.to_string(),
            backbone,
            attached: RwLock::new(HashMap::new()),
        }
    }

    /// Standalone single-node fabric with a private backbone.
    pub fn standalone(node_id: &str) -> Self {
        Self::new(node_id, FabricBackbone::new())
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn attached_partition(&self, handle: &ReplicaHandle) -> Result<Arc<Partition>> {
        let attached = self.attached.read().await;
        match attached.get(&handle.tag) {
            Some(current) if current.partition_id == handle.partition_id => {}
            _ => return Err(VersoError::ReplicaNotFound(handle.tag.clone())),
        }
        drop(attached);

        self.backbone.partition(&handle.tag).await.ok_or_else(|| {
            VersoError::Fabric(format!("partition missing for version {}", handle.tag))
        })
    }
}

#[async_trait]
impl PartitionFabric for MemoryFabric {
    async fn find_local(&self, tag: &VersionTag) -> Result<Option<ReplicaHandle>> {
        let attached = self.attached.read().await;
        Ok(attached.get(tag).cloned())
    }

    async fn create_replica(&self, tag: &VersionTag) -> Result<ReplicaHandle> {
        let mut attached = self.attached.write().await;
        if attached.contains_key(tag) {
            return Err(VersoError::ReplicaExists(tag.clone()));
        }

        self.backbone.ensure_partition(tag).await;

        let handle = ReplicaHandle {
            tag: tag.clone(),
            partition_id: Ulid::new().to_string(),
        };
        attached.insert(tag.clone(), handle.clone());

        tracing::debug!(
            "node {} attached replica {} for version {}",
            self.node_id,
            handle.partition_id,
            tag
        );

        Ok(handle)
    }

    async fn drop_replica(&self, tag: &VersionTag) -> Result<()> {
        let mut attached = self.attached.write().await;
        if attached.remove(tag).is_none() {
            return Err(VersoError::ReplicaNotFound(tag.clone()));
        }

        tracing::debug!("node {} detached replica for version {}", self.node_id, tag);

        Ok(())
    }

    async fn list_local(&self) -> Result<Vec<ReplicaHandle>> {
        let attached = self.attached.read().await;
        Ok(attached.values().cloned().collect())
    }

    async fn write_batch(&self, handle: &ReplicaHandle, entries: Vec<DatasetEntry>) -> Result<()> {
        let partition = self.attached_partition(handle).await?;

        let mut stored = partition.entries.write().await;
        for entry in entries {
            stored.insert(entry.key, entry.value);
        }

        Ok(())
    }

    async fn get(&self, handle: &ReplicaHandle, key: &str) -> Result<Option<Bytes>> {
        let partition = self.attached_partition(handle).await?;

        let stored = partition.entries.read().await;
        Ok(stored.get(key).cloned())
    }

    async fn entry_count(&self, handle: &ReplicaHandle) -> Result<u64> {
        let partition = self.attached_partition(handle).await?;

        let stored = partition.entries.read().await;
        Ok(stored.len() as u64)
    }
}
