use async_trait::async_trait;
use chrono::Utc;
use etcd_client::Client;

use crate::error::Result;
use crate::registry::VersionRegistry;
use crate::version::{ActiveVersionRecord, DisableOutcome, VersionTag};

/// etcd-based registry implementation.
///
/// Mirrors the Redis layout: the active record is one JSON value under a
/// namespaced key, replaced wholesale on every activation.
pub struct EtcdRegistry {
    client: Client,
    prefix: String,
}

impl EtcdRegistry {
    pub async fn new(endpoints: &[String], namespace: &str) -> Result<Self> {
        let client = Client::connect(endpoints, None).await?;
        let prefix = format!("/verso/{}", namespace);

        Ok(Self { client, prefix })
    }

    fn active_key(&self) -> String {
        format!("{}/active_version", self.prefix)
    }

    fn disabled_key(&self, tag: &VersionTag) -> String {
        format!("{}/disabled/{}", self.prefix, tag)
    }
}

#[async_trait]
impl VersionRegistry for EtcdRegistry {
    async fn get_active(&self) -> Result<Option<ActiveVersionRecord>> {
        let mut client = self.client.clone();
        let resp = client.get(self.active_key(), None).await?;

        if let Some(kv) = resp.kvs().first() {
            let record: ActiveVersionRecord = serde_json::from_slice(kv.value())?;
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    async fn set_active(&self, tag: &VersionTag, caller: &str) -> Result<()> {
        let record = ActiveVersionRecord::new(tag.clone(), caller);
        let value = serde_json::to_vec(&record)?;

        let mut client = self.client.clone();
        client.put(self.active_key(), value, None).await?;

        Ok(())
    }

    async fn disable_version(&self, tag: &VersionTag) -> Result<DisableOutcome> {
        if let Some(record) = self.get_active().await? {
            if &record.tag == tag {
                return Ok(DisableOutcome::Ignored);
            }
        }

        let mut client = self.client.clone();
        let key = self.disabled_key(tag);

        let existing = client.get(key.clone(), None).await?;
        if !existing.kvs().is_empty() {
            return Ok(DisableOutcome::Ignored);
        }

        client.put(key, Utc::now().to_rfc3339(), None).await?;

        Ok(DisableOutcome::Disabled)
    }
}
