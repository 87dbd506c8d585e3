use thiserror::Error;

use crate::version::VersionTag;

pub type Result<T> = std::result::Result<T, VersoError>;

#[derive(Error, Debug)]
pub enum VersoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Fabric error: {0}")]
    Fabric(String),

    #[error("Replica already exists for version {0}")]
    ReplicaExists(VersionTag),

    #[error("No local replica for version {0}")]
    ReplicaNotFound(VersionTag),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Load aborted for version {tag}: {reason}")]
    LoadAborted { tag: VersionTag, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<etcd_client::Error> for VersoError {
    fn from(err: etcd_client::Error) -> Self {
        let text = err.to_string();
        if text.contains("permission denied") || text.contains("invalid auth") {
            VersoError::PermissionDenied(text)
        } else {
            VersoError::Registry(text)
        }
    }
}

impl VersoError {
    /// True for the fault a concurrent-create loser receives. Callers of
    /// the join protocol resolve this by re-running the local lookup; it
    /// never signals data loss.
    pub fn is_replica_exists(&self) -> bool {
        matches!(self, VersoError::ReplicaExists(_))
    }
}
