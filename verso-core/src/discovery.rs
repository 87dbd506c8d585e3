use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::fabric::ReplicaHandle;
use crate::registry::VersionRegistry;
use crate::replica_manager::ReplicaManager;

/// Per-node client that resolves "the currently active version" to a
/// usable local replica handle.
///
/// `discover` retries forever on a fixed interval: no backoff, no
/// jitter, no attempt cap. Every failure mode is worth exactly one more
/// poll, so readers ride out registry blips and rollout windows without
/// any failure-classification logic. Callers that need a deadline wrap
/// the future in `tokio::time::timeout` or a `select!`; dropping it is
/// the cancellation path.
pub struct DiscoveryClient {
    registry: Arc<dyn VersionRegistry>,
    replicas: Arc<ReplicaManager>,
    poll_interval: Duration,
}

impl DiscoveryClient {
    pub fn new(
        registry: Arc<dyn VersionRegistry>,
        replicas: Arc<ReplicaManager>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            replicas,
            // A zero interval would busy-spin the retry loop.
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Resolve the active version to a local replica handle, waiting as
    /// long as it takes.
    ///
    /// Handles are call-scoped: every invocation re-reads the registry
    /// and re-runs the join, so the result always reflects the rollout
    /// state at call time, never a cached one.
    pub async fn discover(&self) -> ReplicaHandle {
        loop {
            match self.attempt().await {
                Ok(Some(handle)) => return handle,
                Ok(None) => {
                    tracing::debug!("no active version published yet; polling");
                }
                Err(error) => {
                    tracing::warn!("discovery attempt failed: {}", error);
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn attempt(&self) -> Result<Option<ReplicaHandle>> {
        let record = match self.registry.get_active().await? {
            Some(record) => record,
            None => return Ok(None),
        };

        // Note the tag before joining so the replica being handed out
        // is already shielded from cap eviction.
        self.replicas.note_active(&record.tag).await;
        let outcome = self.replicas.join_or_create(&record.tag).await?;

        Ok(Some(outcome.into_handle()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VersoError;
    use crate::fabric::{FabricBackbone, MemoryFabric, PartitionFabric};
    use crate::registry::memory::MemoryRegistry;
    use crate::version::{ActiveVersionRecord, DisableOutcome, VersionTag};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client_over(registry: Arc<dyn VersionRegistry>) -> DiscoveryClient {
        let fabric = Arc::new(MemoryFabric::standalone("node-a"));
        let replicas = Arc::new(ReplicaManager::new(fabric, registry.clone(), 10));
        DiscoveryClient::new(registry, replicas, Duration::from_millis(10))
    }

    /// Registry double that fails a fixed number of reads before
    /// delegating to an in-memory registry.
    struct FlakyRegistry {
        inner: MemoryRegistry,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl VersionRegistry for FlakyRegistry {
        async fn get_active(&self) -> Result<Option<ActiveVersionRecord>> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(VersoError::Registry("registry unreachable".to_string()));
            }
            self.inner.get_active().await
        }

        async fn set_active(&self, tag: &VersionTag, caller: &str) -> Result<()> {
            self.inner.set_active(tag, caller).await
        }

        async fn disable_version(&self, tag: &VersionTag) -> Result<DisableOutcome> {
            self.inner.disable_version(tag).await
        }
    }

    /// Registry double that counts reads, for bounding the poll loop.
    struct CountingRegistry {
        inner: MemoryRegistry,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl VersionRegistry for CountingRegistry {
        async fn get_active(&self) -> Result<Option<ActiveVersionRecord>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_active().await
        }

        async fn set_active(&self, tag: &VersionTag, caller: &str) -> Result<()> {
            self.inner.set_active(tag, caller).await
        }

        async fn disable_version(&self, tag: &VersionTag) -> Result<DisableOutcome> {
            self.inner.disable_version(tag).await
        }
    }

    #[tokio::test]
    async fn test_discover_waits_out_bootstrap() {
        let registry = Arc::new(MemoryRegistry::new());
        let client = Arc::new(client_over(registry.clone()));
        let tag = VersionTag::mint();

        let waiter = {
            let client = client.clone();
            tokio::spawn(async move { client.discover().await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        registry.set_active(&tag, "publisher").await.unwrap();
        let handle = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.tag, tag);
    }

    #[tokio::test]
    async fn test_discover_rides_out_registry_faults() {
        let inner = MemoryRegistry::new();
        let tag = VersionTag::mint();
        inner.set_active(&tag, "publisher").await.unwrap();

        let registry = Arc::new(FlakyRegistry {
            inner,
            failures_left: AtomicUsize::new(3),
        });
        let client = client_over(registry);

        let handle = tokio::time::timeout(Duration::from_secs(1), client.discover())
            .await
            .unwrap();
        assert_eq!(handle.tag, tag);
    }

    #[tokio::test]
    async fn test_discover_never_serves_a_stale_handle() {
        let registry = Arc::new(MemoryRegistry::new());
        let client = client_over(registry.clone());

        let old = VersionTag::mint();
        registry.set_active(&old, "publisher").await.unwrap();
        let first = client.discover().await;
        assert_eq!(first.tag, old);

        let new = VersionTag::mint();
        registry.set_active(&new, "publisher").await.unwrap();
        let second = client.discover().await;
        assert_eq!(second.tag, new);
    }

    #[tokio::test]
    async fn test_discover_handle_survives_rollover_at_cap_one() {
        let registry = Arc::new(MemoryRegistry::new());
        let backbone = FabricBackbone::new();
        let fabric = Arc::new(MemoryFabric::new("node-a", backbone));
        let replicas = Arc::new(ReplicaManager::new(fabric.clone(), registry.clone(), 1));
        let client = DiscoveryClient::new(registry.clone(), replicas, Duration::from_millis(10));

        let first = VersionTag::mint();
        registry.set_active(&first, "publisher").await.unwrap();
        let handle = client.discover().await;
        assert_eq!(handle.tag, first);

        let second = VersionTag::mint();
        registry.set_active(&second, "publisher").await.unwrap();
        let handle = client.discover().await;
        assert_eq!(handle.tag, second);

        // The handle must point at a live attachment, not one the cap
        // sweep detached on the way out.
        assert!(fabric.find_local(&second).await.unwrap().is_some());
        assert_eq!(fabric.entry_count(&handle).await.unwrap(), 0);
        // The superseded replica is what got reclaimed.
        assert!(fabric.find_local(&first).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_poll_interval_does_not_busy_spin() {
        let registry = Arc::new(CountingRegistry {
            inner: MemoryRegistry::new(),
            reads: AtomicUsize::new(0),
        });
        let fabric = Arc::new(MemoryFabric::standalone("node-a"));
        let replicas = Arc::new(ReplicaManager::new(fabric, registry.clone(), 10));
        let client = DiscoveryClient::new(registry.clone(), replicas, Duration::ZERO);

        // Nothing published: every attempt reads the registry once and
        // then sleeps for the floored interval, so a short window can
        // only fit a bounded number of reads.
        let result = tokio::time::timeout(Duration::from_millis(50), client.discover()).await;
        assert!(result.is_err());
        assert!(registry.reads.load(Ordering::SeqCst) < 500);
    }

    #[tokio::test]
    async fn test_discover_is_abandoned_by_dropping_the_future() {
        let registry = Arc::new(MemoryRegistry::new());
        let client = client_over(registry);

        // Nothing published: the loop would spin forever. The timeout
        // wrapper drops the future, which is the supported way to stop it.
        let result = tokio::time::timeout(Duration::from_millis(50), client.discover()).await;
        assert!(result.is_err());
    }
}
