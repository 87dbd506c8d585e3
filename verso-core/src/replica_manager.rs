use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use crate::error::{Result, VersoError};
use crate::fabric::{PartitionFabric, ReplicaHandle};
use crate::registry::VersionRegistry;
use crate::version::VersionTag;

/// How a join request was satisfied.
///
/// The branch taken is part of the contract: callers (and tests) can
/// tell whether they were the first writer for a tag on this node or
/// landed on a replica someone else created. A lost create race is not
/// an error; it resolves to `Existing`.
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    /// This call created the local replica.
    Created(ReplicaHandle),
    /// A replica already existed, or a concurrent creator won the race.
    Existing(ReplicaHandle),
}

impl JoinOutcome {
    pub fn handle(&self) -> &ReplicaHandle {
        match self {
            JoinOutcome::Created(handle) => handle,
            JoinOutcome::Existing(handle) => handle,
        }
    }

    pub fn into_handle(self) -> ReplicaHandle {
        match self {
            JoinOutcome::Created(handle) => handle,
            JoinOutcome::Existing(handle) => handle,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, JoinOutcome::Created(_))
    }
}

#[derive(Default)]
struct ManagerState {
    /// Tag most recently observed as active; shielded from eviction.
    active_hint: Option<VersionTag>,
    /// Tags with a join currently in flight, with caller counts.
    joins_in_flight: HashMap<VersionTag, usize>,
    /// Join recency per tag, driven by `join_seq`.
    last_joined: HashMap<VersionTag, u64>,
    join_seq: u64,
}

type PinMap = Arc<StdMutex<HashMap<VersionTag, usize>>>;

fn lock_pins(pins: &PinMap) -> std::sync::MutexGuard<'_, HashMap<VersionTag, usize>> {
    match pins.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// RAII shield against eviction of one tag's replica.
///
/// Held by a publisher for the duration of a bulk load so cap pressure
/// from concurrent joins cannot detach the half-built replica.
pub struct ReplicaPin {
    tag: VersionTag,
    pins: PinMap,
}

impl Drop for ReplicaPin {
    fn drop(&mut self) {
        let mut pins = lock_pins(&self.pins);
        if let Some(count) = pins.get_mut(&self.tag) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&self.tag);
            }
        }
    }
}

/// Owns the node-local replica set: the join-or-create primitive plus
/// the soft cap on simultaneous replicas.
///
/// Joins are deliberately not serialized against each other; concurrent
/// callers race the fabric's `create_replica` and losers resolve via a
/// re-find. Eviction, by contrast, holds the manager state lock across
/// the fabric detach, so "evict tag T" cannot interleave with
/// "join tag T". Cap sweeps consult the registry so the replica of the
/// currently named version is never detached.
pub struct ReplicaManager {
    fabric: Arc<dyn PartitionFabric>,
    registry: Arc<dyn VersionRegistry>,
    replica_cap: usize,
    state: Mutex<ManagerState>,
    pins: PinMap,
}

impl ReplicaManager {
    pub fn new(
        fabric: Arc<dyn PartitionFabric>,
        registry: Arc<dyn VersionRegistry>,
        replica_cap: usize,
    ) -> Self {
        Self {
            fabric,
            registry,
            // Cap 0 would leave no room for the active replica itself.
            replica_cap: replica_cap.max(1),
            state: Mutex::new(ManagerState::default()),
            pins: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Join the local replica for `tag`, creating it if this node has
    /// none yet.
    ///
    /// 1. `find_local` hit: `Existing`.
    /// 2. Otherwise `create_replica`: `Created`.
    /// 3. On a duplicate-replica fault, a concurrent caller won the
    ///    race a moment ago: re-run `find_local` and return `Existing`.
    /// Any other fault propagates to the caller.
    pub async fn join_or_create(&self, tag: &VersionTag) -> Result<JoinOutcome> {
        {
            let mut state = self.state.lock().await;
            *state.joins_in_flight.entry(tag.clone()).or_insert(0) += 1;
        }

        let result = self.join_inner(tag).await;

        {
            let mut state = self.state.lock().await;
            if let Some(count) = state.joins_in_flight.get_mut(tag) {
                *count -= 1;
                if *count == 0 {
                    state.joins_in_flight.remove(tag);
                }
            }
            if result.is_ok() {
                state.join_seq += 1;
                let seq = state.join_seq;
                state.last_joined.insert(tag.clone(), seq);
            }
        }

        if result.is_ok() {
            self.enforce_cap(tag).await;
        }

        result
    }

    async fn join_inner(&self, tag: &VersionTag) -> Result<JoinOutcome> {
        if let Some(handle) = self.fabric.find_local(tag).await? {
            return Ok(JoinOutcome::Existing(handle));
        }

        match self.fabric.create_replica(tag).await {
            Ok(handle) => Ok(JoinOutcome::Created(handle)),
            Err(err) if err.is_replica_exists() => {
                // Lost the create race; the winner's replica is visible now.
                match self.fabric.find_local(tag).await? {
                    Some(handle) => Ok(JoinOutcome::Existing(handle)),
                    None => Err(VersoError::Internal(format!(
                        "replica for version {} vanished between create fault and re-find",
                        tag
                    ))),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Record `tag` as the observed active version, shielding its
    /// replica from eviction until a newer tag takes over.
    pub async fn note_active(&self, tag: &VersionTag) {
        let mut state = self.state.lock().await;
        state.active_hint = Some(tag.clone());
    }

    /// Pin `tag` against eviction for the lifetime of the returned guard.
    pub fn pin(&self, tag: &VersionTag) -> ReplicaPin {
        let mut pins = lock_pins(&self.pins);
        *pins.entry(tag.clone()).or_insert(0) += 1;
        drop(pins);

        ReplicaPin {
            tag: tag.clone(),
            pins: self.pins.clone(),
        }
    }

    /// Detach least-recently-joined replicas while over the cap.
    ///
    /// Exempt: the tag whose join triggered this sweep, the tag the
    /// registry currently names, the locally noted active tag, pinned
    /// tags, and tags with a join in flight. The state lock is held
    /// across each detach; that is the mutual exclusion between
    /// eviction and joins. The cap is soft: when every tag over the
    /// limit is exempt, or the registry cannot be read, nothing is
    /// detached.
    async fn enforce_cap(&self, just_joined: &VersionTag) {
        let mut state = self.state.lock().await;

        let local = match self.fabric.list_local().await {
            Ok(local) => local,
            Err(error) => {
                tracing::warn!("cap sweep could not list local replicas: {}", error);
                return;
            }
        };
        if local.len() <= self.replica_cap {
            return;
        }

        // The local hint can lag a rollover, so ask the registry which
        // tag is current before detaching anything.
        let registry_active = match self.registry.get_active().await {
            Ok(record) => record.map(|record| record.tag),
            Err(error) => {
                tracing::warn!("cap sweep could not read the active version: {}", error);
                return;
            }
        };

        let pinned: Vec<VersionTag> = lock_pins(&self.pins).keys().cloned().collect();

        let mut candidates: Vec<(u64, VersionTag)> = local
            .iter()
            .filter(|handle| &handle.tag != just_joined)
            .filter(|handle| Some(&handle.tag) != registry_active.as_ref())
            .filter(|handle| Some(&handle.tag) != state.active_hint.as_ref())
            .filter(|handle| !pinned.contains(&handle.tag))
            .filter(|handle| !state.joins_in_flight.contains_key(&handle.tag))
            .map(|handle| {
                let seq = state.last_joined.get(&handle.tag).copied().unwrap_or(0);
                (seq, handle.tag.clone())
            })
            .collect();
        candidates.sort();

        let excess = local.len() - self.replica_cap;
        for (_, tag) in candidates.into_iter().take(excess) {
            if let Err(error) = self.fabric.drop_replica(&tag).await {
                tracing::warn!("failed to evict replica for version {}: {}", tag, error);
                continue;
            }
            state.last_joined.remove(&tag);
            tracing::info!("evicted replica for version {} under cap pressure", tag);
        }
    }
}
