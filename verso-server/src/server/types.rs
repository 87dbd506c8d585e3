use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub namespace: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct VersionResponse {
    pub tag: String,
    pub updated_at: String,
    pub updated_by: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct EntryResponse {
    pub key: String,
    pub version: String,
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PublishRequestBody {
    pub publisher: String,
    pub entries: Vec<PublishEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PublishEntry {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct PublishResponse {
    pub tag: String,
    pub previous: Option<String>,
    pub entries_loaded: u64,
    pub previous_disabled: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReplicasResponse {
    pub replicas: Vec<ReplicaItem>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReplicaItem {
    pub tag: String,
    pub partition_id: String,
    pub entries: u64,
    pub active: bool,
}
