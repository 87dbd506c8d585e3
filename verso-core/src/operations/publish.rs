use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, VersoError};
use crate::fabric::{DatasetEntry, PartitionFabric, ReplicaHandle};
use crate::registry::VersionRegistry;
use crate::replica_manager::ReplicaManager;
use crate::version::{DisableOutcome, VersionTag};

/// Source of one complete dataset build.
///
/// The orchestrator drives the loader exactly once per publish, against
/// a partition no reader can see yet. Returning an error abandons the
/// partition and the publish.
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    async fn load(&self, writer: &mut PartitionWriter<'_>) -> Result<()>;
}

/// Buffered writer over one replica, flushing to the fabric in batches.
pub struct PartitionWriter<'a> {
    fabric: &'a dyn PartitionFabric,
    handle: &'a ReplicaHandle,
    batch_size: usize,
    buffer: Vec<DatasetEntry>,
    written: u64,
}

impl<'a> PartitionWriter<'a> {
    fn new(fabric: &'a dyn PartitionFabric, handle: &'a ReplicaHandle, batch_size: usize) -> Self {
        Self {
            fabric,
            handle,
            // A zero batch size would buffer forever; clamp to one.
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            written: 0,
        }
    }

    pub async fn put(&mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Result<()> {
        self.buffer.push(DatasetEntry::new(key.into(), value.into()));
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.buffer);
        self.written += batch.len() as u64;
        self.fabric.write_batch(self.handle, batch).await
    }

    async fn finish(mut self) -> Result<u64> {
        self.flush().await?;
        Ok(self.written)
    }
}

#[derive(Clone)]
pub struct PublishOperation {
    registry: Arc<dyn VersionRegistry>,
    replicas: Arc<ReplicaManager>,
    fabric: Arc<dyn PartitionFabric>,
    batch_size: usize,
}

pub struct PublishOperationRequest {
    pub publisher: String,
    pub loader: Arc<dyn DatasetLoader>,
}

#[derive(Debug, Clone)]
pub struct PublishOperationResult {
    pub tag: VersionTag,
    pub previous: Option<VersionTag>,
    pub entries_loaded: u64,
    pub previous_disabled: bool,
}

impl PublishOperation {
    pub fn new(
        registry: Arc<dyn VersionRegistry>,
        replicas: Arc<ReplicaManager>,
        fabric: Arc<dyn PartitionFabric>,
        batch_size: usize,
    ) -> Self {
        Self {
            registry,
            replicas,
            fabric,
            batch_size,
        }
    }

    /// Build a fresh version and make it active.
    ///
    /// Mint tag, create the partition, bulk-load it, then activate. The
    /// partition stays unreachable until the activation write: no other
    /// node knows the tag, so no isolation beyond that is needed. The
    /// `set_active` call is the single commit point; everything after it
    /// is best-effort cleanup.
    pub async fn run(&self, request: PublishOperationRequest) -> Result<PublishOperationResult> {
        let PublishOperationRequest { publisher, loader } = request;

        let previous = self.registry.get_active().await?.map(|record| record.tag);

        let tag = VersionTag::mint();
        tracing::info!("publisher {} minted version {}", publisher, tag);

        // Pin before joining so no cap sweep can detach the half-built
        // replica between creation and activation.
        let _pin = self.replicas.pin(&tag);
        let outcome = self.replicas.join_or_create(&tag).await?;
        let handle = outcome.into_handle();

        let mut writer = PartitionWriter::new(self.fabric.as_ref(), &handle, self.batch_size);
        if let Err(error) = loader.load(&mut writer).await {
            tracing::warn!("load for version {} failed, abandoning publish: {}", tag, error);
            return Err(VersoError::LoadAborted {
                tag,
                reason: error.to_string(),
            });
        }
        let entries_loaded = match writer.finish().await {
            Ok(count) => count,
            Err(error) => {
                tracing::warn!("final flush for version {} failed, abandoning publish: {}", tag, error);
                return Err(VersoError::LoadAborted {
                    tag,
                    reason: error.to_string(),
                });
            }
        };

        // Commit point. Failures surface to the caller undisguised and
        // are not retried here.
        self.registry.set_active(&tag, &publisher).await?;
        self.replicas.note_active(&tag).await;
        tracing::info!(
            "version {} is now active ({} entries, previous: {})",
            tag,
            entries_loaded,
            previous
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        let mut previous_disabled = false;
        if let Some(old) = &previous {
            match self.registry.disable_version(old).await {
                Ok(DisableOutcome::Disabled) => previous_disabled = true,
                Ok(DisableOutcome::Ignored) => {}
                Err(error) => {
                    tracing::warn!("could not disable previous version {}: {}", old, error);
                }
            }
        }

        Ok(PublishOperationResult {
            tag,
            previous,
            entries_loaded,
            previous_disabled,
        })
    }
}
