//! Active-version registry: the single slot every node reads to learn
//! which dataset version is current.
//!
//! Provides a trait-based abstraction for different backend implementations
//! (memory, Redis, etcd).

pub mod etcd;
pub mod factory;
pub mod memory;
pub mod redis;

use crate::error::Result;
use crate::version::{ActiveVersionRecord, DisableOutcome, VersionTag};
use async_trait::async_trait;

pub use factory::RegistryBuilder;

/// Trait for active-version registry implementations.
///
/// The registry holds zero or one `ActiveVersionRecord`; there is no
/// further state machine. Readers poll it, the publisher replaces it.
#[async_trait]
pub trait VersionRegistry: Send + Sync {
    /// Read the record naming the current version.
    ///
    /// `Ok(None)` is the bootstrap state: no version has ever been
    /// published in this namespace.
    async fn get_active(&self) -> Result<Option<ActiveVersionRecord>>;

    /// Replace the active record wholesale, naming `tag` as current.
    ///
    /// This is the only correctness-relevant write in the rollout
    /// protocol. Any single reader sees either the old record or the new
    /// one, never a mixture. Backends surface ACL failures as
    /// `VersoError::PermissionDenied`.
    async fn set_active(&self, tag: &VersionTag, caller: &str) -> Result<()>;

    /// Record an advisory retirement marker for `tag`.
    ///
    /// Disabling the currently active tag is refused with `Ignored`, as
    /// is re-disabling a tag that already carries a marker. Failures here
    /// are non-fatal to callers; the marker is bookkeeping, not the
    /// switch.
    async fn disable_version(&self, tag: &VersionTag) -> Result<DisableOutcome>;
}

/// Type alias for dynamic registry
pub type DynVersionRegistry = dyn VersionRegistry;
