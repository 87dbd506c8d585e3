use crate::config::Config;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::interval;
use verso_core::{
    DatasetNode, MemoryFabric, PartitionFabric, Result, VersionRegistry, VersionTag, VersoError,
};

mod external;
mod types;

use external::{health, v1_get_entry, v1_publish, v1_replicas, v1_version};
pub(crate) use types::*;

pub struct ServerState {
    pub(crate) node: Arc<DatasetNode>,
    pub(crate) config: Config,
}

pub async fn run_server(config: Config, registry: Arc<dyn VersionRegistry>) -> Result<()> {
    let node_cfg = config.node.clone();

    let fabric: Arc<dyn PartitionFabric> = Arc::new(MemoryFabric::standalone(&node_cfg.node_id));
    let node = Arc::new(DatasetNode::new(
        &node_cfg.node_id,
        registry,
        fabric,
        config.rollout_config(),
    ));

    let state = Arc::new(ServerState {
        node,
        config: config.clone(),
    });

    {
        let watcher_state = state.clone();
        tokio::spawn(async move {
            let mut ticker = interval(watcher_state.node.config().poll_interval);
            let mut last_seen: Option<VersionTag> = None;
            loop {
                ticker.tick().await;
                match watcher_state.node.registry().get_active().await {
                    Ok(Some(record)) => {
                        if last_seen.as_ref() != Some(&record.tag) {
                            tracing::info!(
                                "active version is now {} (updated by {})",
                                record.tag,
                                record.updated_by
                            );
                            last_seen = Some(record.tag);
                        }
                    }
                    Ok(None) => {}
                    Err(error) => {
                        tracing::warn!("Failed to poll active version: {}", error);
                    }
                }
            }
        });
    }

    let app = router(state);

    let listener = TcpListener::bind(&node_cfg.bind_addr).await?;
    tracing::info!("Verso listening on {}", node_cfg.bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|error| VersoError::Internal(error.to_string()))?;

    Ok(())
}

pub(crate) fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/version", get(v1_version))
        .route("/api/v1/entries/*key", get(v1_get_entry))
        .route("/api/v1/publish", post(v1_publish))
        .route("/api/v1/replicas", get(v1_replicas))
        .with_state(state)
}

pub(crate) fn normalize_entry_key(key: &str) -> Result<String> {
    let trimmed = key.trim_matches('/');
    if trimmed.is_empty() {
        return Err(VersoError::InvalidRequest(
            "entry key cannot be empty".to_string(),
        ));
    }

    for component in trimmed.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(VersoError::InvalidRequest(format!(
                "invalid entry key component: {}",
                component
            )));
        }
    }

    Ok(trimmed.to_string())
}

pub(crate) fn response_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_entry_key() {
        assert_eq!(normalize_entry_key("/sku-1/").unwrap(), "sku-1");
        assert_eq!(
            normalize_entry_key("catalog/sku-1").unwrap(),
            "catalog/sku-1"
        );
        assert!(normalize_entry_key("//").is_err());
        assert!(normalize_entry_key("a/../b").is_err());
    }
}
