//! Verso Core - zero-downtime dataset version rollover for peer-to-peer nodes

pub mod discovery;
pub mod error;
pub mod fabric;
pub mod node;
pub mod operations;
pub mod registry;
pub mod replica_manager;
pub mod version;

pub use discovery::DiscoveryClient;
pub use error::{Result, VersoError};
pub use fabric::{
    DatasetEntry, DynPartitionFabric, FabricBackbone, MemoryFabric, PartitionFabric, ReplicaHandle,
};
pub use node::{DatasetNode, RolloutConfig};
pub use operations::*;
pub use registry::etcd::EtcdRegistry;
pub use registry::memory::MemoryRegistry;
pub use registry::redis::RedisRegistry;
pub use registry::{DynVersionRegistry, RegistryBuilder, VersionRegistry};
pub use replica_manager::{JoinOutcome, ReplicaManager, ReplicaPin};
pub use version::{ActiveVersionRecord, DisableOutcome, VersionTag};
