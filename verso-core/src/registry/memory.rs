use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, VersoError};
use crate::registry::VersionRegistry;
use crate::version::{ActiveVersionRecord, DisableOutcome, VersionTag};

/// In-process registry used by tests and single-process deployments.
///
/// The optional writer allow-list stands in for the access control the
/// backing fabric normally enforces, so permission faults on
/// `set_active` are reproducible without a real backend.
pub struct MemoryRegistry {
    state: RwLock<MemoryState>,
    allowed_writers: Option<HashSet<String>>,
}

#[derive(Default)]
struct MemoryState {
    active: Option<ActiveVersionRecord>,
    disabled: HashSet<VersionTag>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            allowed_writers: None,
        }
    }

    /// Restrict `set_active` to the named callers.
    pub fn with_allowed_writers(writers: &[&str]) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            allowed_writers: Some(writers.iter().map(|w| w.to_string()).collect()),
        }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VersionRegistry for MemoryRegistry {
    async fn get_active(&self) -> Result<Option<ActiveVersionRecord>> {
        let state = self.state.read().await;
        Ok(state.active.clone())
    }

    async fn set_active(&self, tag: &VersionTag, caller: &str) -> Result<()> {
        if let Some(allowed) = &self.allowed_writers {
            if !allowed.contains(caller) {
                return Err(VersoError::PermissionDenied(format!(
                    "caller {} may not update the active version",
                    caller
                )));
            }
        }

        let mut state = self.state.write().await;
        state.active = Some(ActiveVersionRecord::new(tag.clone(), caller));
        Ok(())
    }

    async fn disable_version(&self, tag: &VersionTag) -> Result<DisableOutcome> {
        let mut state = self.state.write().await;
        if state.active.as_ref().map(|record| &record.tag) == Some(tag) {
            return Ok(DisableOutcome::Ignored);
        }

        if state.disabled.insert(tag.clone()) {
            Ok(DisableOutcome::Disabled)
        } else {
            Ok(DisableOutcome::Ignored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bootstrap_state_is_none() {
        let registry = MemoryRegistry::new();
        assert!(registry.get_active().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_active_replaces_wholesale() {
        let registry = MemoryRegistry::new();
        let first = VersionTag::mint();
        let second = VersionTag::mint();

        registry.set_active(&first, "pub-a").await.unwrap();
        let record = registry.get_active().await.unwrap().unwrap();
        assert_eq!(record.tag, first);
        assert_eq!(record.updated_by, "pub-a");

        registry.set_active(&second, "pub-b").await.unwrap();
        let record = registry.get_active().await.unwrap().unwrap();
        assert_eq!(record.tag, second);
        assert_eq!(record.updated_by, "pub-b");
    }

    #[tokio::test]
    async fn test_allow_list_rejects_unknown_caller() {
        let registry = MemoryRegistry::with_allowed_writers(&["publisher"]);
        let tag = VersionTag::mint();

        let err = registry.set_active(&tag, "intruder").await.unwrap_err();
        assert!(matches!(err, VersoError::PermissionDenied(_)));
        assert!(registry.get_active().await.unwrap().is_none());

        registry.set_active(&tag, "publisher").await.unwrap();
        assert_eq!(registry.get_active().await.unwrap().unwrap().tag, tag);
    }

    #[tokio::test]
    async fn test_disable_skips_active_and_repeated_tags() {
        let registry = MemoryRegistry::new();
        let active = VersionTag::mint();
        let retired = VersionTag::mint();
        registry.set_active(&active, "pub").await.unwrap();

        assert_eq!(
            registry.disable_version(&active).await.unwrap(),
            DisableOutcome::Ignored
        );
        assert_eq!(
            registry.disable_version(&retired).await.unwrap(),
            DisableOutcome::Disabled
        );
        assert_eq!(
            registry.disable_version(&retired).await.unwrap(),
            DisableOutcome::Ignored
        );
    }
}
