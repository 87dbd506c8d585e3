use std::sync::Arc;
use std::time::Duration;

use crate::discovery::DiscoveryClient;
use crate::error::Result;
use crate::fabric::{PartitionFabric, ReplicaHandle};
use crate::operations::publish::{
    DatasetLoader, PublishOperation, PublishOperationRequest, PublishOperationResult,
};
use crate::registry::VersionRegistry;
use crate::replica_manager::ReplicaManager;

/// Operational knobs for the rollout protocol. Deployment-tuned, never
/// hard-coded at call sites.
#[derive(Debug, Clone)]
pub struct RolloutConfig {
    /// Delay between discovery attempts.
    pub poll_interval: Duration,
    /// Soft ceiling on simultaneous local replicas.
    pub replica_cap: usize,
    /// Entries per fabric write during a bulk load.
    pub load_batch_size: usize,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            replica_cap: 10,
            load_batch_size: 500,
        }
    }
}

/// One node's view of the versioned dataset.
///
/// This is the whole boundary external collaborators get: resolve the
/// active version to a replica handle, or publish a new version and
/// make it active. Everything else (polling, join races, eviction) is
/// internal.
pub struct DatasetNode {
    node_id: String,
    registry: Arc<dyn VersionRegistry>,
    fabric: Arc<dyn PartitionFabric>,
    replicas: Arc<ReplicaManager>,
    discovery: DiscoveryClient,
    config: RolloutConfig,
}

impl DatasetNode {
    pub fn new(
        node_id: &str,
        registry: Arc<dyn VersionRegistry>,
        fabric: Arc<dyn PartitionFabric>,
        config: RolloutConfig,
    ) -> Self {
        let replicas = Arc::new(ReplicaManager::new(
            fabric.clone(),
            registry.clone(),
            config.replica_cap,
        ));
        let discovery =
            DiscoveryClient::new(registry.clone(), replicas.clone(), config.poll_interval);

        Self {
            node_id: node_id.to_string(),
            registry,
            fabric,
            replicas,
            discovery,
            config,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn registry(&self) -> &Arc<dyn VersionRegistry> {
        &self.registry
    }

    pub fn fabric(&self) -> &Arc<dyn PartitionFabric> {
        &self.fabric
    }

    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    /// Resolve the currently active version to a local replica handle,
    /// waiting as long as it takes. Wrap in a timeout for a deadline.
    pub async fn active_replica(&self) -> ReplicaHandle {
        self.discovery.discover().await
    }

    /// Build and activate a brand-new dataset version.
    pub async fn publish(
        &self,
        publisher: &str,
        loader: Arc<dyn DatasetLoader>,
    ) -> Result<PublishOperationResult> {
        let operation = PublishOperation::new(
            self.registry.clone(),
            self.replicas.clone(),
            self.fabric.clone(),
            self.config.load_batch_size,
        );

        operation
            .run(PublishOperationRequest {
                publisher: publisher.to_string(),
                loader,
            })
            .await
    }

    /// Replicas currently attached on this node.
    pub async fn local_replicas(&self) -> Result<Vec<ReplicaHandle>> {
        self.fabric.list_local().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::fabric::{FabricBackbone, MemoryFabric};
    use crate::operations::publish::PartitionWriter;
    use crate::registry::memory::MemoryRegistry;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    struct VecLoader {
        entries: Vec<(String, String)>,
    }

    #[async_trait]
    impl DatasetLoader for VecLoader {
        async fn load(&self, writer: &mut PartitionWriter<'_>) -> Result<()> {
            for (key, value) in &self.entries {
                writer.put(key.clone(), value.clone().into_bytes()).await?;
            }
            Ok(())
        }
    }

    /// Loader that writes everything, then parks until released, so a
    /// test can hold a publish open at the pre-activation stage.
    struct GatedLoader {
        entries: Vec<(String, String)>,
        loaded: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl DatasetLoader for GatedLoader {
        async fn load(&self, writer: &mut PartitionWriter<'_>) -> Result<()> {
            for (key, value) in &self.entries {
                writer.put(key.clone(), value.clone().into_bytes()).await?;
            }
            self.loaded.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    fn loader(pairs: &[(&str, &str)]) -> Arc<VecLoader> {
        Arc::new(VecLoader {
            entries: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    fn node_on(
        node_id: &str,
        registry: &Arc<dyn VersionRegistry>,
        backbone: &Arc<FabricBackbone>,
    ) -> Arc<DatasetNode> {
        let fabric: Arc<dyn PartitionFabric> =
            Arc::new(MemoryFabric::new(node_id, backbone.clone()));
        Arc::new(DatasetNode::new(
            node_id,
            registry.clone(),
            fabric,
            RolloutConfig {
                poll_interval: Duration::from_millis(10),
                ..Default::default()
            },
        ))
    }

    #[tokio::test]
    async fn test_cluster_converges_after_publish() {
        let registry: Arc<dyn VersionRegistry> = Arc::new(MemoryRegistry::new());
        let backbone = FabricBackbone::new();
        let publisher = node_on("node-pub", &registry, &backbone);
        let readers = vec![
            node_on("node-1", &registry, &backbone),
            node_on("node-2", &registry, &backbone),
            node_on("node-3", &registry, &backbone),
        ];

        let result = publisher
            .publish("pub-1", loader(&[("sku-1", "widget"), ("sku-2", "gadget")]))
            .await
            .unwrap();

        for reader in &readers {
            let handle = timeout(Duration::from_secs(1), reader.active_replica())
                .await
                .unwrap();
            assert_eq!(handle.tag, result.tag);
            assert_eq!(
                reader.fabric().get(&handle, "sku-2").await.unwrap().unwrap(),
                Bytes::from("gadget")
            );
        }
    }

    #[tokio::test]
    async fn test_reader_blocks_until_first_publish() {
        let registry: Arc<dyn VersionRegistry> = Arc::new(MemoryRegistry::new());
        let backbone = FabricBackbone::new();
        let publisher = node_on("node-pub", &registry, &backbone);
        let reader = node_on("node-1", &registry, &backbone);

        let waiter = {
            let reader = reader.clone();
            tokio::spawn(async move { reader.active_replica().await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        let result = publisher
            .publish("pub-1", loader(&[("sku-1", "widget")]))
            .await
            .unwrap();

        let handle = timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.tag, result.tag);
    }

    #[tokio::test]
    async fn test_publish_under_load_switches_cleanly() {
        let registry: Arc<dyn VersionRegistry> = Arc::new(MemoryRegistry::new());
        let backbone = FabricBackbone::new();
        let publisher = node_on("node-pub", &registry, &backbone);
        let reader = node_on("node-read", &registry, &backbone);

        let morning = publisher
            .publish("pub-1", loader(&[("sku-1", "morning")]))
            .await
            .unwrap();

        let first_seen = timeout(Duration::from_secs(1), reader.active_replica())
            .await
            .unwrap();
        assert_eq!(first_seen.tag, morning.tag);

        let loaded = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let slow = Arc::new(GatedLoader {
            entries: vec![("sku-1".to_string(), "evening".to_string())],
            loaded: loaded.clone(),
            release: release.clone(),
        });

        let publish_task = {
            let publisher = publisher.clone();
            tokio::spawn(async move { publisher.publish("pub-1", slow).await })
        };

        // The rebuild is fully written but not yet activated. Readers
        // must keep landing on the morning version.
        loaded.notified().await;
        let mid_rollout = timeout(Duration::from_secs(1), reader.active_replica())
            .await
            .unwrap();
        assert_eq!(mid_rollout.tag, morning.tag);
        assert_eq!(
            reader
                .fabric()
                .get(&mid_rollout, "sku-1")
                .await
                .unwrap()
                .unwrap(),
            Bytes::from("morning")
        );

        release.notify_one();
        let evening = timeout(Duration::from_secs(1), publish_task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // One poll interval later at most, discovery lands on the new
        // version.
        let switched = timeout(Duration::from_secs(1), reader.active_replica())
            .await
            .unwrap();
        assert_eq!(switched.tag, evening.tag);
        assert_eq!(
            reader
                .fabric()
                .get(&switched, "sku-1")
                .await
                .unwrap()
                .unwrap(),
            Bytes::from("evening")
        );

        // The superseded version is still attached and readable; the
        // handle this reader already held keeps working.
        assert_eq!(
            reader
                .fabric()
                .get(&first_seen, "sku-1")
                .await
                .unwrap()
                .unwrap(),
            Bytes::from("morning")
        );
    }

    #[tokio::test]
    async fn test_local_replicas_lists_attachments() {
        let registry: Arc<dyn VersionRegistry> = Arc::new(MemoryRegistry::new());
        let backbone = FabricBackbone::new();
        let node = node_on("node-a", &registry, &backbone);

        assert!(node.local_replicas().await.unwrap().is_empty());

        let result = node
            .publish("pub-1", loader(&[("sku-1", "widget")]))
            .await
            .unwrap();

        let replicas = node.local_replicas().await.unwrap();
        assert_eq!(replicas.len(), 1);
        assert_eq!(replicas[0].tag, result.tag);
    }
}
