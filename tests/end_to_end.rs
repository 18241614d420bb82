//! End-to-end scenarios exercising the store, index, tool dispatcher, and
//! sync engine together, the way a real client/server pair would.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use inbetweenies::graph::index::GraphIndex;
use inbetweenies::graph::store::GraphStore;
use inbetweenies::sync::{
    resolve_conflict, ChangeType, ConflictRecord, EntityChange, Side, SyncChange, SyncEngine,
    SyncReceiver, SyncResponse, SyncTransport, SyncType, PROTOCOL_VERSION,
};
use inbetweenies::tools::ToolDispatcher;
use serde_json::json;

fn fresh_dispatcher() -> (Arc<GraphStore>, Arc<RwLock<GraphIndex>>, ToolDispatcher) {
    let store = Arc::new(GraphStore::open_in_memory().unwrap());
    let index = Arc::new(RwLock::new(GraphIndex::new()));
    let dispatcher = ToolDispatcher::new(store.clone(), index.clone(), 10, 100, 10);
    (store, index, dispatcher)
}

/// Scenario 1: create then read back through the tool surface.
#[test]
fn create_then_read_returns_matching_version_and_content() {
    let (_store, _index, dispatcher) = fresh_dispatcher();

    let created = dispatcher.dispatch(
        "create_entity",
        json!({ "entity_type": "device", "name": "Smart TV", "content": {"brand": "X"}, "user_id": "u1" }),
    );
    assert!(created["success"].as_bool().unwrap());
    let entity_id = created["result"]["entity_id"].as_str().unwrap().to_string();

    let details = dispatcher.dispatch("get_entity_details", json!({ "entity_id": entity_id }));
    assert!(details["success"].as_bool().unwrap());

    let version = details["result"]["entity"]["version"].as_str().unwrap();
    let (timestamp, user_id) = version.rsplit_once('-').expect("version has a -user_id suffix");
    assert_eq!(user_id, "u1");
    assert!(DateTime::parse_from_rfc3339(timestamp).is_ok(), "prefix {timestamp} isn't RFC3339");
    assert_eq!(details["result"]["entity"]["content"]["brand"], "X");
}

/// Scenario 2: updating an entity creates a new version, never mutates in place.
#[test]
fn update_creates_new_version_with_parent_link() {
    let (store, _index, dispatcher) = fresh_dispatcher();

    let created = dispatcher.dispatch(
        "create_entity",
        json!({ "entity_type": "device", "name": "Smart TV", "content": {"brand": "X"}, "user_id": "u1" }),
    );
    let entity_id = created["result"]["entity_id"].as_str().unwrap().to_string();
    let v1 = created["result"]["version"].as_str().unwrap().to_string();

    let updated = dispatcher.dispatch(
        "update_entity",
        json!({ "entity_id": entity_id, "user_id": "u1", "changes": {"content": {"brand": "Y"}} }),
    );
    assert!(updated["success"].as_bool().unwrap());

    let versions = store.get_entity_versions(&entity_id).unwrap();
    assert_eq!(versions.len(), 2);
    let latest = versions.iter().max_by_key(|e| e.created_at).unwrap();
    assert_eq!(latest.parent_versions, vec![v1]);
    assert_eq!(latest.content["brand"], "Y");
}

/// Scenario 3: last-write-wins picks the newer timestamp with the documented reason.
#[test]
fn conflict_resolution_prefers_newer_timestamp() {
    let local = ConflictRecord { updated_at: dt("2025-01-01T10:00:00Z"), sync_id: "aaa" };
    let remote = ConflictRecord { updated_at: dt("2025-01-01T11:00:00Z"), sync_id: "bbb" };

    let resolution = resolve_conflict(&local, &remote);
    assert_eq!(resolution.winner, Side::Remote);
    assert_eq!(resolution.reason, "remote has newer timestamp");
    assert_eq!(resolution.timestamp_diff_ms, 3_600_000);
}

/// Scenario 4: equal timestamps fall back to comparing sync ids.
#[test]
fn conflict_resolution_tiebreaks_on_sync_id() {
    let t = dt("2025-01-01T10:00:00Z");
    let local = ConflictRecord { updated_at: t, sync_id: "mmm" };
    let remote = ConflictRecord { updated_at: t, sync_id: "zzz" };

    let resolution = resolve_conflict(&local, &remote);
    assert_eq!(resolution.winner, Side::Remote);
    assert!(resolution.reason.contains("sync_id"));
}

/// Scenario 5: path finding follows LOCATED_IN edges, and returns empty for
/// disconnected ids.
#[test]
fn find_path_walks_located_in_chain() {
    let (store, index, dispatcher) = fresh_dispatcher();

    let device = dispatcher.dispatch(
        "create_entity",
        json!({ "entity_type": "device", "name": "Thermostat", "user_id": "u1" }),
    );
    let room = dispatcher.dispatch("create_entity", json!({ "entity_type": "room", "name": "Kitchen", "user_id": "u1" }));
    let zone = dispatcher.dispatch("create_entity", json!({ "entity_type": "zone", "name": "Downstairs", "user_id": "u1" }));
    let stray = dispatcher.dispatch("create_entity", json!({ "entity_type": "device", "name": "Doorbell", "user_id": "u1" }));

    let device_id = device["result"]["entity_id"].as_str().unwrap();
    let room_id = room["result"]["entity_id"].as_str().unwrap();
    let zone_id = zone["result"]["entity_id"].as_str().unwrap();
    let stray_id = stray["result"]["entity_id"].as_str().unwrap();

    dispatcher.dispatch(
        "create_relationship",
        json!({ "from_entity_id": device_id, "to_entity_id": room_id, "relationship_type": "located_in", "user_id": "u1" }),
    );
    dispatcher.dispatch(
        "create_relationship",
        json!({ "from_entity_id": room_id, "to_entity_id": zone_id, "relationship_type": "located_in", "user_id": "u1" }),
    );

    let path = dispatcher.dispatch("find_path", json!({ "from_entity_id": device_id, "to_entity_id": zone_id, "max_depth": 5 }));
    let found: Vec<String> = path["result"]["path"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(found, vec![device_id, room_id, zone_id]);

    let disconnected = dispatcher.dispatch("find_path", json!({ "from_entity_id": device_id, "to_entity_id": stray_id, "max_depth": 5 }));
    assert!(disconnected["result"]["path"].as_array().unwrap().is_empty());

    drop((store, index));
}

struct MockTransport {
    peer_store: Arc<GraphStore>,
    peer_index: Arc<RwLock<GraphIndex>>,
}

impl SyncTransport for MockTransport {
    async fn exchange(
        &self,
        request: inbetweenies::sync::SyncRequest,
    ) -> inbetweenies::error::Result<SyncResponse> {
        let receiver = SyncReceiver::new(self.peer_store.clone(), self.peer_index.clone());
        let (stats, conflicts) = receiver.apply_changes(&request.changes)?;

        let outgoing: Vec<SyncChange> = self
            .peer_index
            .read()
            .unwrap()
            .all_entities()
            .map(|e| SyncChange {
                change_type: ChangeType::Create,
                entity: Some(EntityChange {
                    id: e.entity_id.clone(),
                    version: e.version.clone(),
                    entity_type: e.entity_type,
                    name: e.name.clone(),
                    content: e.content.clone(),
                    source_type: e.source_type,
                    user_id: e.user_id.clone(),
                    parent_versions: e.parent_versions.clone(),
                    created_at: e.created_at,
                    updated_at: e.updated_at,
                }),
                relationships: vec![],
            })
            .collect();

        Ok(SyncResponse {
            protocol_version: PROTOCOL_VERSION.to_string(),
            sync_type: SyncType::Delta,
            changes: outgoing,
            conflicts,
            vector_clock: request.vector_clock,
            cursor: None,
            sync_stats: stats,
        })
    }

    async fn health(&self) -> bool {
        true
    }
}

/// Scenario 6 (adapted): a client accumulates pending changes while the
/// server is unreachable, then syncs once the server comes up.
#[tokio::test]
async fn offline_changes_land_once_sync_succeeds() {
    let (client_store, client_index, client_dispatcher) = fresh_dispatcher();
    let server_store = Arc::new(GraphStore::open_in_memory().unwrap());
    let server_index = Arc::new(RwLock::new(GraphIndex::new()));

    for name in ["Lamp", "Fan", "Sensor"] {
        let result = client_dispatcher.dispatch(
            "create_entity",
            json!({ "entity_type": "device", "name": name, "user_id": "u1" }),
        );
        assert!(result["success"].as_bool().unwrap());
    }

    let pending: Vec<SyncChange> = client_index
        .read()
        .unwrap()
        .all_entities()
        .map(|e| SyncChange {
            change_type: ChangeType::Create,
            entity: Some(EntityChange {
                id: e.entity_id.clone(),
                version: e.version.clone(),
                entity_type: e.entity_type,
                name: e.name.clone(),
                content: e.content.clone(),
                source_type: e.source_type,
                user_id: e.user_id.clone(),
                parent_versions: e.parent_versions.clone(),
                created_at: e.created_at,
                updated_at: e.updated_at,
            }),
            relationships: vec![],
        })
        .collect();
    assert_eq!(pending.len(), 3);

    let transport = MockTransport { peer_store: server_store.clone(), peer_index: server_index.clone() };
    let engine = SyncEngine::new(client_store.clone(), client_index.clone(), transport, "client-1".to_string());

    let response = engine.sync_with_peer("server", pending).await.unwrap();
    assert_eq!(response.sync_stats.entities_applied, 3);
    assert_eq!(server_index.read().unwrap().all_entities().count(), 3);
    assert_eq!(engine.state_for("server"), inbetweenies::sync::SyncState::Idle);
}

async fn spawn_server(replica_id: &str) -> (String, inbetweenies::AppState) {
    let config = inbetweenies::config::Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        db_path: ":memory:".to_string(),
        replica_id: replica_id.to_string(),
        auth_tokens: vec!["test-token".to_string()],
        default_max_depth: 10,
        default_limit: 10,
        max_limit: 100,
        health_timeout_ms: 1_000,
        sync_timeout_ms: 5_000,
    };
    let state = inbetweenies::AppState::new(config).unwrap();
    let app = axum::Router::new().merge(inbetweenies::api::router()).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

/// Scenario 7: two real replicas, each behind a real HTTP listener running
/// the crate's own router, converge on the same entity set across two sync
/// rounds each way — exercising `src/api/sync.rs`'s actual `exchange`
/// handler rather than a hand-rolled transport.
#[tokio::test]
async fn multi_client_convergence_over_real_http() {
    let (_client_url, client_state) = spawn_server("client-1").await;
    let (server_url, server_state) = spawn_server("server").await;

    let client_dispatcher = ToolDispatcher::new(
        client_state.store.clone(),
        client_state.index.clone(),
        10,
        100,
        10,
    );
    client_dispatcher.dispatch(
        "create_entity",
        json!({ "entity_type": "home", "name": "Main House", "user_id": "u1" }),
    );

    let transport =
        inbetweenies::sync::HttpSyncTransport::new(server_url.clone(), Some("test-token".to_string()), 5_000)
            .unwrap();
    let engine = SyncEngine::new(
        client_state.store.clone(),
        client_state.index.clone(),
        transport,
        "client-1".to_string(),
    );

    assert!(engine.health_check().await);

    // Round 1: push the client's home up to the server.
    let pending: Vec<SyncChange> = client_state
        .index
        .read()
        .unwrap()
        .all_entities()
        .map(|e| SyncChange {
            change_type: ChangeType::Create,
            entity: Some(EntityChange {
                id: e.entity_id.clone(),
                version: e.version.clone(),
                entity_type: e.entity_type,
                name: e.name.clone(),
                content: e.content.clone(),
                source_type: e.source_type,
                user_id: e.user_id.clone(),
                parent_versions: e.parent_versions.clone(),
                created_at: e.created_at,
                updated_at: e.updated_at,
            }),
            relationships: vec![],
        })
        .collect();
    // Server has nothing to offer back yet, so the client-side stats for
    // this round are all zero even though the push itself landed.
    let response = engine.sync_with_peer("server", pending).await.unwrap();
    assert_eq!(response.sync_stats.entities_applied, 0);
    assert_eq!(server_state.index.read().unwrap().all_entities().count(), 1);

    // Meanwhile the server gains an entity of its own.
    let server_dispatcher =
        ToolDispatcher::new(server_state.store.clone(), server_state.index.clone(), 10, 100, 10);
    server_dispatcher.dispatch(
        "create_entity",
        json!({ "entity_type": "room", "name": "Kitchen", "user_id": "u2" }),
    );

    // Round 2: an empty push from the client still pulls the server's
    // pending change back, because `exchange` now scans for real outbound
    // changes instead of always returning an empty list.
    let response = engine.sync_with_peer("server", vec![]).await.unwrap();
    assert_eq!(response.sync_stats.entities_applied, 1);
    assert_eq!(client_state.index.read().unwrap().all_entities().count(), 2);
    assert_eq!(server_state.index.read().unwrap().all_entities().count(), 2);

    let mut client_ids: Vec<String> =
        client_state.index.read().unwrap().all_entities().map(|e| e.entity_id.clone()).collect();
    let mut server_ids: Vec<String> =
        server_state.index.read().unwrap().all_entities().map(|e| e.entity_id.clone()).collect();
    client_ids.sort();
    server_ids.sort();
    assert_eq!(client_ids, server_ids);
}

fn dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}
