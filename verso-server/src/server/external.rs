use super::{
    normalize_entry_key, response_error, EntryResponse, HealthResponse, PublishEntry,
    PublishRequestBody, PublishResponse, ReplicaItem, ReplicasResponse, ServerState,
    VersionResponse,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use verso_core::{DatasetLoader, PartitionWriter, Result, VersoError};

pub(crate) async fn health(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        node_id: state.node.node_id().to_string(),
        namespace: state.config.registry.namespace_or_default().to_string(),
    })
}

pub(crate) async fn v1_version(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let record = match state.node.registry().get_active().await {
        Ok(record) => record,
        Err(error) => return response_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    };

    match record {
        Some(record) => (
            StatusCode::OK,
            Json(VersionResponse {
                tag: record.tag.to_string(),
                updated_at: record.updated_at.to_rfc3339(),
                updated_by: record.updated_by,
            }),
        )
            .into_response(),
        None => response_error(StatusCode::NOT_FOUND, "no active version published yet"),
    }
}

pub(crate) async fn v1_get_entry(
    State(state): State<Arc<ServerState>>,
    Path(raw_key): Path<String>,
) -> impl IntoResponse {
    let key = match normalize_entry_key(&raw_key) {
        Ok(key) => key,
        Err(error) => return response_error(StatusCode::BAD_REQUEST, error.to_string()),
    };

    // Discovery retries forever by design; the HTTP surface is where a
    // deadline gets wrapped around it.
    let handle = match tokio::time::timeout(
        state.config.discover_timeout(),
        state.node.active_replica(),
    )
    .await
    {
        Ok(handle) => handle,
        Err(_) => {
            return response_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "no active version available within the discovery deadline",
            );
        }
    };

    let value = match state.node.fabric().get(&handle, &key).await {
        Ok(value) => value,
        Err(error) => return response_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    };

    match value {
        Some(bytes) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(value) => (
                StatusCode::OK,
                Json(EntryResponse {
                    key,
                    version: handle.tag.to_string(),
                    value,
                }),
            )
                .into_response(),
            Err(error) => response_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("stored entry is not valid JSON: {}", error),
            ),
        },
        None => response_error(StatusCode::NOT_FOUND, format!("no entry for key {}", key)),
    }
}

struct JsonEntriesLoader {
    entries: Vec<PublishEntry>,
}

#[async_trait::async_trait]
impl DatasetLoader for JsonEntriesLoader {
    async fn load(&self, writer: &mut PartitionWriter<'_>) -> Result<()> {
        for entry in &self.entries {
            let value = serde_json::to_vec(&entry.value)?;
            writer.put(entry.key.clone(), value).await?;
        }
        Ok(())
    }
}

pub(crate) async fn v1_publish(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<PublishRequestBody>,
) -> impl IntoResponse {
    if body.publisher.trim().is_empty() {
        return response_error(StatusCode::BAD_REQUEST, "publisher cannot be empty");
    }
    if body.entries.is_empty() {
        return response_error(StatusCode::BAD_REQUEST, "entries cannot be empty");
    }

    let loader = Arc::new(JsonEntriesLoader {
        entries: body.entries,
    });

    match state.node.publish(&body.publisher, loader).await {
        Ok(result) => (
            StatusCode::OK,
            Json(PublishResponse {
                tag: result.tag.to_string(),
                previous: result.previous.map(|tag| tag.to_string()),
                entries_loaded: result.entries_loaded,
                previous_disabled: result.previous_disabled,
            }),
        )
            .into_response(),
        Err(VersoError::PermissionDenied(message)) => {
            response_error(StatusCode::FORBIDDEN, message)
        }
        Err(error) => response_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    }
}

pub(crate) async fn v1_replicas(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let replicas = match state.node.local_replicas().await {
        Ok(replicas) => replicas,
        Err(error) => return response_error(StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    };

    let active_tag = match state.node.registry().get_active().await {
        Ok(record) => record.map(|record| record.tag),
        Err(_) => None,
    };

    let mut items = Vec::with_capacity(replicas.len());
    for handle in replicas {
        let entries = state
            .node
            .fabric()
            .entry_count(&handle)
            .await
            .unwrap_or_default();

        items.push(ReplicaItem {
            active: Some(&handle.tag) == active_tag.as_ref(),
            tag: handle.tag.to_string(),
            partition_id: handle.partition_id,
            entries,
        });
    }
    items.sort_by(|a, b| a.tag.cmp(&b.tag));

    (StatusCode::OK, Json(ReplicasResponse { replicas: items })).into_response()
}
