use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::entity::{EntityType, SourceType};
use crate::graph::relationship::RelationshipType;

pub const PROTOCOL_VERSION: &str = "inbetweenies-v2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Full,
    Delta,
    Entities,
    Relationships,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

/// The entity half of a `SyncChange`. A distinct `sync_id` field is
/// unnecessary: `version` already fills that role (see
/// `conflict::ConflictRecord`). Deletes carry a full `EntityChange` too, with
/// `content.deleted = true` forced onto it — a tombstone needs
/// `updated_at`/`user_id`/`parent_versions` like any other version in order
/// to run through the same conflict rule as a create or update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChange {
    pub id: String,
    pub version: String,
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default)]
    pub content: Value,
    pub source_type: SourceType,
    pub user_id: String,
    #[serde(default)]
    pub parent_versions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipChange {
    pub id: String,
    pub from_entity_id: String,
    pub from_entity_version: String,
    pub to_entity_id: String,
    pub to_entity_version: String,
    pub relationship_type: RelationshipType,
    #[serde(default)]
    pub properties: Value,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncChange {
    pub change_type: ChangeType,
    pub entity: Option<EntityChange>,
    #[serde(default)]
    pub relationships: Vec<RelationshipChange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_types: Option<Vec<EntityType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub protocol_version: String,
    pub device_id: String,
    pub user_id: String,
    pub sync_type: SyncType,
    #[serde(default)]
    pub vector_clock: HashMap<String, u64>,
    #[serde(default)]
    pub changes: Vec<SyncChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<SyncFilters>,
}

impl SyncRequest {
    pub fn new(device_id: String, user_id: String, sync_type: SyncType) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            device_id,
            user_id,
            sync_type,
            vector_clock: HashMap::new(),
            changes: Vec::new(),
            cursor: None,
            filters: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    pub entity_id: String,
    pub local_version: String,
    pub remote_version: String,
    pub resolution_strategy: String,
    pub winner: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub entities_applied: usize,
    pub relationships_applied: usize,
    pub conflicts_resolved: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub protocol_version: String,
    pub sync_type: SyncType,
    #[serde(default)]
    pub changes: Vec<SyncChange>,
    #[serde(default)]
    pub conflicts: Vec<ConflictInfo>,
    pub vector_clock: HashMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub sync_stats: SyncStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_request_wire_shape_uses_camel_case() {
        let mut req = SyncRequest::new("device-1".to_string(), "u1".to_string(), SyncType::Delta);
        req.filters = Some(SyncFilters {
            entity_types: Some(vec![EntityType::Device]),
            since: None,
            modified_by: None,
        });
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"protocolVersion\":\"inbetweenies-v2\""));
        assert!(json.contains("\"deviceId\":\"device-1\""));
        assert!(json.contains("\"entityTypes\":[\"device\"]"));
    }

    #[test]
    fn delete_change_carries_a_tombstoned_entity() {
        let now = Utc::now();
        let change = SyncChange {
            change_type: ChangeType::Delete,
            entity: Some(EntityChange {
                id: "e1".to_string(),
                version: "v1".to_string(),
                entity_type: EntityType::Device,
                name: "Lamp".to_string(),
                content: serde_json::json!({"deleted": true}),
                source_type: SourceType::Manual,
                user_id: "u1".to_string(),
                parent_versions: vec![],
                created_at: now,
                updated_at: now,
            }),
            relationships: vec![],
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["entity"]["content"]["deleted"], true);
        assert_eq!(json["entity"]["id"], "e1");
    }

    #[test]
    fn round_trip_sync_response() {
        let resp = SyncResponse {
            protocol_version: PROTOCOL_VERSION.to_string(),
            sync_type: SyncType::Full,
            changes: vec![],
            conflicts: vec![],
            vector_clock: HashMap::from([("server".to_string(), 4u64)]),
            cursor: None,
            sync_stats: SyncStats::default(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: SyncResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.protocol_version, PROTOCOL_VERSION);
        assert_eq!(back.vector_clock.get("server"), Some(&4));
    }
}
