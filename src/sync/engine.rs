use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::graph::entity::Entity;
use crate::graph::index::GraphIndex;
use crate::graph::relationship::Relationship;
use crate::graph::store::GraphStore;

use super::conflict::{resolve_conflict, ConflictRecord, Side};
use super::protocol::{
    ChangeType, ConflictInfo, EntityChange, RelationshipChange, SyncChange, SyncRequest,
    SyncResponse, SyncStats, SyncType, PROTOCOL_VERSION,
};
use super::transport::SyncTransport;

/// State of this replica's relationship with a given peer. Mirrors the
/// `sync_metadata` row it is persisted alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    InProgress,
    Failed,
}

const MAX_BACKOFF_SECS: i64 = 300;

/// Applies inbound [`SyncChange`]s against the local store and index. Holds
/// no transport, so it is shared by the active side of a sync round (after
/// [`SyncEngine::run_round`] gets a response back) and the passive side (an
/// HTTP handler receiving someone else's [`SyncRequest`] directly).
pub struct SyncReceiver {
    store: std::sync::Arc<GraphStore>,
    index: std::sync::Arc<RwLock<GraphIndex>>,
}

impl SyncReceiver {
    pub fn new(store: std::sync::Arc<GraphStore>, index: std::sync::Arc<RwLock<GraphIndex>>) -> Self {
        Self { store, index }
    }

    /// Applies a batch of inbound changes, returning the stats and any
    /// conflicts resolved in the local side's favor.
    pub fn apply_changes(&self, changes: &[SyncChange]) -> Result<(SyncStats, Vec<ConflictInfo>)> {
        let mut stats = SyncStats::default();
        let mut conflicts = Vec::new();

        for change in changes {
            match change.change_type {
                ChangeType::Delete => {
                    if let Some(entity_change) = &change.entity {
                        let tombstone = mark_deleted(entity_change);
                        if let Some(conflict) = self.apply_inbound_entity(&tombstone)? {
                            conflicts.push(conflict);
                            stats.conflicts_resolved += 1;
                        } else {
                            stats.entities_applied += 1;
                        }
                    }
                }
                ChangeType::Create | ChangeType::Update => {
                    if let Some(entity_change) = &change.entity {
                        if let Some(conflict) = self.apply_inbound_entity(entity_change)? {
                            conflicts.push(conflict);
                            stats.conflicts_resolved += 1;
                        } else {
                            stats.entities_applied += 1;
                        }
                    }
                    for rel_change in &change.relationships {
                        self.apply_inbound_relationship(rel_change)?;
                        stats.relationships_applied += 1;
                    }
                }
            }
        }

        Ok((stats, conflicts))
    }

    /// Applies one inbound entity change, resolving against the locally
    /// stored version (if one with the same `entity_id` exists) via
    /// [`resolve_conflict`]. Returns `Some(ConflictInfo)` only when the
    /// incoming side lost and was discarded.
    fn apply_inbound_entity(&self, incoming: &EntityChange) -> Result<Option<ConflictInfo>> {
        let local = self.store.get_entity(&incoming.id, None)?;

        if let Some(local_entity) = &local {
            let local_record = ConflictRecord::from(local_entity);
            let remote_record = ConflictRecord {
                updated_at: incoming.updated_at,
                sync_id: incoming.version.as_str(),
            };
            let resolution = resolve_conflict(&local_record, &remote_record);
            if resolution.winner == Side::Local {
                return Ok(Some(ConflictInfo {
                    entity_id: incoming.id.clone(),
                    local_version: local_entity.version.clone(),
                    remote_version: incoming.version.clone(),
                    resolution_strategy: resolution.reason,
                    winner: "local".to_string(),
                }));
            }
        }

        let entity = Entity {
            entity_id: incoming.id.clone(),
            version: incoming.version.clone(),
            entity_type: incoming.entity_type,
            name: incoming.name.clone(),
            content: incoming.content.clone(),
            source_type: incoming.source_type,
            user_id: incoming.user_id.clone(),
            parent_versions: incoming.parent_versions.clone(),
            created_at: incoming.created_at,
            updated_at: incoming.updated_at,
        };

        if entity.is_deleted() {
            info!(entity_id = %entity.entity_id, version = %entity.version, "applying tombstone");
        }

        match self.store.store_entity(entity.clone()) {
            Ok(stored) => {
                self.index.write().unwrap().apply_entity_write(stored);
                Ok(None)
            }
            Err(CoreError::DuplicateVersion(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn apply_inbound_relationship(&self, incoming: &RelationshipChange) -> Result<()> {
        let rel = Relationship {
            id: incoming.id.clone(),
            from_entity_id: incoming.from_entity_id.clone(),
            from_entity_version: incoming.from_entity_version.clone(),
            to_entity_id: incoming.to_entity_id.clone(),
            to_entity_version: incoming.to_entity_version.clone(),
            relationship_type: incoming.relationship_type,
            properties: incoming.properties.clone(),
            user_id: incoming.user_id.clone(),
            created_at: incoming.created_at,
            updated_at: incoming.updated_at,
        };
        match self.store.store_relationship(rel.clone()) {
            Ok(stored) => {
                self.index.write().unwrap().apply_relationship_write(stored);
                Ok(())
            }
            Err(CoreError::InvalidRelationship(_)) => Err(CoreError::InvalidRelationship(format!(
                "rejected inbound relationship {}",
                incoming.id
            ))),
            Err(e) => Err(e),
        }
    }
}

/// Orchestrates one full sync round between this replica and a peer: gather
/// local pending changes, exchange with the peer, resolve conflicts
/// deterministically, apply the inbound side, and record bookkeeping. Holds
/// one `tokio::sync::Mutex`-free lock per peer id so two concurrent sync
/// calls against the same peer serialize instead of racing; different peers
/// proceed independently.
pub struct SyncEngine<T: SyncTransport> {
    receiver: SyncReceiver,
    transport: T,
    replica_id: String,
    peer_locks: DashMap<String, std::sync::Mutex<()>>,
    states: DashMap<String, SyncState>,
    failures: DashMap<String, u32>,
}

impl<T: SyncTransport> SyncEngine<T> {
    pub fn new(
        store: std::sync::Arc<GraphStore>,
        index: std::sync::Arc<RwLock<GraphIndex>>,
        transport: T,
        replica_id: String,
    ) -> Self {
        Self {
            receiver: SyncReceiver::new(store, index),
            transport,
            replica_id,
            peer_locks: DashMap::new(),
            states: DashMap::new(),
            failures: DashMap::new(),
        }
    }

    pub fn state_for(&self, peer_id: &str) -> SyncState {
        self.states.get(peer_id).map(|s| *s).unwrap_or(SyncState::Idle)
    }

    fn lock_for(&self, peer_id: &str) -> dashmap::mapref::one::Ref<'_, String, std::sync::Mutex<()>> {
        self.peer_locks
            .entry(peer_id.to_string())
            .or_insert_with(|| std::sync::Mutex::new(()));
        self.peer_locks.get(peer_id).unwrap()
    }

    /// Run one sync round against `peer_id`. Refuses to start a second round
    /// against the same peer while one is already in progress.
    pub async fn sync_with_peer(&self, peer_id: &str, pending: Vec<SyncChange>) -> Result<SyncResponse> {
        if self.state_for(peer_id) == SyncState::InProgress {
            return Err(CoreError::SyncInProgress(peer_id.to_string()));
        }

        let guard = self.lock_for(peer_id);
        let _held = guard.lock().unwrap();
        self.states.insert(peer_id.to_string(), SyncState::InProgress);

        let result = self.run_round(pending).await;

        match &result {
            Ok(_) => {
                self.states.insert(peer_id.to_string(), SyncState::Idle);
                self.failures.remove(peer_id);
                info!(peer_id, "sync round succeeded");
            }
            Err(err) => {
                self.states.insert(peer_id.to_string(), SyncState::Failed);
                let failure_count = {
                    let mut entry = self.failures.entry(peer_id.to_string()).or_insert(0);
                    *entry += 1;
                    *entry
                };
                let backoff = backoff_secs(failure_count);
                warn!(peer_id, error = %err, failure_count, backoff, "sync round failed");
            }
        }

        result
    }

    async fn run_round(&self, pending: Vec<SyncChange>) -> Result<SyncResponse> {
        let mut vector_clock = HashMap::new();
        vector_clock.insert(self.replica_id.clone(), pending.len() as u64);

        let mut request = SyncRequest::new(
            self.replica_id.clone(),
            self.replica_id.clone(),
            SyncType::Delta,
        );
        request.vector_clock = vector_clock;
        request.changes = pending;

        let response = self.transport.exchange(request).await?;
        if response.protocol_version != PROTOCOL_VERSION {
            return Err(CoreError::InvalidInput(format!(
                "unsupported protocol version {}",
                response.protocol_version
            )));
        }

        let (stats, conflicts) = self.receiver.apply_changes(&response.changes)?;

        Ok(SyncResponse {
            protocol_version: PROTOCOL_VERSION.to_string(),
            sync_type: response.sync_type,
            changes: vec![],
            conflicts,
            vector_clock: response.vector_clock,
            cursor: response.cursor,
            sync_stats: stats,
        })
    }

    pub async fn health_check(&self) -> bool {
        self.transport.health().await
    }
}

/// Forces `content.deleted = true` onto an inbound delete's payload, so a
/// tombstone is a normal, conflict-resolvable entity version rather than a
/// bare id — the sender is trusted to set this already, but the receiver
/// doesn't rely on that.
fn mark_deleted(incoming: &EntityChange) -> EntityChange {
    let mut tombstone = incoming.clone();
    let mut content = tombstone.content.as_object().cloned().unwrap_or_default();
    content.insert("deleted".to_string(), Value::Bool(true));
    tombstone.content = Value::Object(content);
    tombstone
}

/// `min(30 * 2^failures, 300)` seconds, per the retry-backoff rule.
fn backoff_secs(failure_count: u32) -> i64 {
    let shift = failure_count.min(20);
    (30i64 * (1i64 << shift)).min(MAX_BACKOFF_SECS)
}

pub fn next_retry_time(failure_count: u32) -> chrono::DateTime<Utc> {
    Utc::now() + chrono::Duration::seconds(backoff_secs(failure_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::entity::{EntityType, SourceType};
    use std::sync::Arc;

    struct MockTransport {
        response: SyncResponse,
    }

    impl SyncTransport for MockTransport {
        async fn exchange(&self, _request: SyncRequest) -> Result<SyncResponse> {
            Ok(self.response.clone())
        }

        async fn health(&self) -> bool {
            true
        }
    }

    fn entity_change(id: &str, name: &str) -> EntityChange {
        let now = Utc::now();
        EntityChange {
            id: id.to_string(),
            version: Entity::new_version("peer"),
            entity_type: EntityType::Device,
            name: name.to_string(),
            content: serde_json::json!({}),
            source_type: SourceType::Manual,
            user_id: "peer".to_string(),
            parent_versions: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn applies_inbound_create_with_no_local_conflict() {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        let index = Arc::new(RwLock::new(GraphIndex::new()));
        let response = SyncResponse {
            protocol_version: PROTOCOL_VERSION.to_string(),
            sync_type: SyncType::Delta,
            changes: vec![SyncChange {
                change_type: ChangeType::Create,
                entity: Some(entity_change("d1", "Lamp")),
                relationships: vec![],
            }],
            conflicts: vec![],
            vector_clock: HashMap::new(),
            cursor: None,
            sync_stats: SyncStats::default(),
        };
        let transport = MockTransport { response };
        let engine = SyncEngine::new(store.clone(), index, transport, "server".to_string());

        let result = engine.sync_with_peer("peer-1", vec![]).await.unwrap();
        assert_eq!(result.sync_stats.entities_applied, 1);
        assert!(store.get_entity("d1", None).unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_sync_against_same_peer_is_rejected() {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        let index = Arc::new(RwLock::new(GraphIndex::new()));
        let response = SyncResponse {
            protocol_version: PROTOCOL_VERSION.to_string(),
            sync_type: SyncType::Delta,
            changes: vec![],
            conflicts: vec![],
            vector_clock: HashMap::new(),
            cursor: None,
            sync_stats: SyncStats::default(),
        };
        let transport = MockTransport { response };
        let engine = SyncEngine::new(store, index, transport, "server".to_string());
        engine.states.insert("peer-1".to_string(), SyncState::InProgress);
        let err = engine.sync_with_peer("peer-1", vec![]).await.unwrap_err();
        assert!(matches!(err, CoreError::SyncInProgress(_)));
    }

    #[test]
    fn inbound_delete_stores_a_tombstone_version() {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        let index = Arc::new(RwLock::new(GraphIndex::new()));
        let receiver = SyncReceiver::new(store.clone(), index);

        let create = SyncChange {
            change_type: ChangeType::Create,
            entity: Some(entity_change("d1", "Lamp")),
            relationships: vec![],
        };
        receiver.apply_changes(&[create]).unwrap();
        assert!(!store.get_entity("d1", None).unwrap().unwrap().is_deleted());

        let delete = SyncChange {
            change_type: ChangeType::Delete,
            entity: Some(entity_change("d1", "Lamp")),
            relationships: vec![],
        };
        let (stats, conflicts) = receiver.apply_changes(&[delete]).unwrap();
        assert_eq!(stats.entities_applied, 1);
        assert!(conflicts.is_empty());

        let latest = store.get_entity("d1", None).unwrap().unwrap();
        assert!(latest.is_deleted());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_secs(0), 30);
        assert_eq!(backoff_secs(1), 60);
        assert_eq!(backoff_secs(2), 120);
        assert_eq!(backoff_secs(10), MAX_BACKOFF_SECS);
    }
}
