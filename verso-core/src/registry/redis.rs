use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;

use crate::error::{Result, VersoError};
use crate::registry::VersionRegistry;
use crate::version::{ActiveVersionRecord, DisableOutcome, VersionTag};

/// Redis-based registry implementation.
///
/// The active record lives as one JSON value under a namespaced key, so
/// a plain GET/SET pair gives the wholesale-replace semantics the
/// protocol needs.
pub struct RedisRegistry {
    conn: Mutex<redis::aio::MultiplexedConnection>,
    prefix: String,
}

impl RedisRegistry {
    /// Create a new Redis registry client
    pub async fn new(url: &str, namespace: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| VersoError::Config(format!("Failed to connect to Redis: {}", e)))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| VersoError::Config(format!("Failed to connect to Redis: {}", e)))?;

        // Test with a ping
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| VersoError::Config(format!("Redis ping failed: {}", e)))?;

        let prefix = format!("verso:{}", namespace);

        Ok(Self {
            conn: Mutex::new(conn),
            prefix,
        })
    }

    fn active_key(&self) -> String {
        format!("{}:active_version", self.prefix)
    }

    fn disabled_key(&self, tag: &VersionTag) -> String {
        format!("{}:disabled:{}", self.prefix, tag)
    }
}

fn map_write_error(error: redis::RedisError) -> VersoError {
    match error.code() {
        Some("NOPERM") | Some("NOAUTH") => VersoError::PermissionDenied(error.to_string()),
        _ => VersoError::Registry(format!(
            "Failed to write active version to Redis: {}",
            error
        )),
    }
}

#[async_trait]
impl VersionRegistry for RedisRegistry {
    async fn get_active(&self) -> Result<Option<ActiveVersionRecord>> {
        let mut conn = self.conn.lock().await;
        let key = self.active_key();

        let value: Option<Vec<u8>> = conn.get(&key).await.map_err(|e| {
            VersoError::Registry(format!("Failed to read active version from Redis: {}", e))
        })?;

        match value {
            Some(data) => {
                let record: ActiveVersionRecord = serde_json::from_slice(&data)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn set_active(&self, tag: &VersionTag, caller: &str) -> Result<()> {
        let record = ActiveVersionRecord::new(tag.clone(), caller);
        let value = serde_json::to_vec(&record)?;

        let mut conn = self.conn.lock().await;
        let key = self.active_key();

        let _: () = conn.set(key, value).await.map_err(map_write_error)?;

        Ok(())
    }

    async fn disable_version(&self, tag: &VersionTag) -> Result<DisableOutcome> {
        if let Some(record) = self.get_active().await? {
            if &record.tag == tag {
                return Ok(DisableOutcome::Ignored);
            }
        }

        let mut conn = self.conn.lock().await;
        let key = self.disabled_key(tag);

        let marked: bool = conn
            .set_nx(&key, Utc::now().to_rfc3339())
            .await
            .map_err(|e| {
                VersoError::Registry(format!("Failed to mark version disabled in Redis: {}", e))
            })?;

        if marked {
            Ok(DisableOutcome::Disabled)
        } else {
            Ok(DisableOutcome::Ignored)
        }
    }
}
