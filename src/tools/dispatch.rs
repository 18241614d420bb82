use std::sync::{Arc, RwLock};

use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{CoreError, Result as CoreResult};
use crate::graph::entity::{Entity, EntityType};
use crate::graph::index::{Direction, GraphIndex};
use crate::graph::relationship::{Relationship, RelationshipType};
use crate::graph::store::GraphStore;
use crate::search;

use super::catalog::{catalog, TOOL_NAMES};

/// Holds the two layers every tool needs: the durable store for writes and
/// lookups by id, and the in-memory index for traversal and search. Read
/// tools consult the index first; write tools commit to the store and then
/// notify the index, mirroring the data-flow described for L4.
pub struct ToolDispatcher {
    store: Arc<GraphStore>,
    index: Arc<RwLock<GraphIndex>>,
    default_limit: usize,
    max_limit: usize,
    default_max_depth: u32,
}

impl ToolDispatcher {
    pub fn new(
        store: Arc<GraphStore>,
        index: Arc<RwLock<GraphIndex>>,
        default_limit: usize,
        max_limit: usize,
        default_max_depth: u32,
    ) -> Self {
        Self { store, index, default_limit, max_limit, default_max_depth }
    }

    /// Dispatch by name. Never propagates an error out: every failure path
    /// becomes `{"success": false, "error": ...}` in the returned envelope.
    pub fn dispatch(&self, name: &str, params: Value) -> Value {
        if !TOOL_NAMES.contains(&name) {
            return json!({
                "success": false,
                "error": format!("unknown tool: {name}"),
                "available_tools": catalog(),
            });
        }

        let result = match name {
            "get_devices_in_room" => self.get_devices_in_room(&params),
            "find_device_controls" => self.find_device_controls(&params),
            "get_room_connections" => self.get_room_connections(&params),
            "search_entities" => self.search_entities(&params),
            "create_entity" => self.create_entity(&params),
            "create_relationship" => self.create_relationship(&params),
            "find_path" => self.find_path(&params),
            "get_entity_details" => self.get_entity_details(&params),
            "find_similar_entities" => self.find_similar_entities(&params),
            "get_procedures_for_device" => self.get_procedures_for_device(&params),
            "get_automations_in_room" => self.get_automations_in_room(&params),
            "update_entity" => self.update_entity(&params),
            _ => unreachable!("checked against TOOL_NAMES above"),
        };

        match result {
            Ok(value) => json!({ "success": true, "result": value }),
            Err(err) => json!({ "success": false, "error": err.to_string() }),
        }
    }

    fn required_str<'a>(params: &'a Value, field: &str) -> CoreResult<&'a str> {
        params
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::InvalidInput(format!("{field} is required")))
    }

    fn clamp_limit(&self, params: &Value, cap: usize) -> usize {
        let requested = params.get("limit").and_then(Value::as_u64).unwrap_or(self.default_limit as u64) as usize;
        requested.min(cap).min(self.max_limit).max(1)
    }

    fn max_depth(&self, params: &Value, cap: u32) -> u32 {
        let requested = params
            .get("max_depth")
            .and_then(Value::as_u64)
            .unwrap_or(self.default_max_depth as u64) as u32;
        requested.min(cap)
    }

    fn get_devices_in_room(&self, params: &Value) -> CoreResult<Value> {
        let room_id = Self::required_str(params, "room_id")?;
        let index = self.index.read().unwrap();
        let room = index
            .get_entity(room_id)
            .ok_or_else(|| CoreError::NotFound(format!("room {room_id}")))?;
        if room.entity_type != EntityType::Room {
            return Err(CoreError::InvalidInput(format!("{room_id} is not a room")));
        }

        let devices: Vec<&Entity> = index
            .get_connected_entities(room_id, Some(RelationshipType::LocatedIn), Direction::Incoming, 1)
            .into_iter()
            .filter_map(|conn| index.get_entity(&conn.entity.entity_id))
            .filter(|e| e.entity_type == EntityType::Device)
            .collect();

        Ok(json!(devices))
    }

    fn find_device_controls(&self, params: &Value) -> CoreResult<Value> {
        let device_id = Self::required_str(params, "device_id")?;
        let index = self.index.read().unwrap();
        let device = index
            .get_entity(device_id)
            .ok_or_else(|| CoreError::NotFound(format!("device {device_id}")))?;
        if device.entity_type != EntityType::Device {
            return Err(CoreError::InvalidInput(format!("{device_id} is not a device")));
        }

        let controllers: Vec<&Entity> = index
            .get_connected_entities(device_id, Some(RelationshipType::Controls), Direction::Incoming, 1)
            .into_iter()
            .filter_map(|conn| index.get_entity(&conn.entity.entity_id))
            .collect();

        Ok(json!(controllers))
    }

    fn get_room_connections(&self, params: &Value) -> CoreResult<Value> {
        let room_id = Self::required_str(params, "room_id")?;
        let index = self.index.read().unwrap();
        index
            .get_entity(room_id)
            .ok_or_else(|| CoreError::NotFound(format!("room {room_id}")))?;

        let connections = index.get_connected_entities(room_id, Some(RelationshipType::ConnectsTo), Direction::Both, 2);
        Ok(json!(connections))
    }

    fn search_entities(&self, params: &Value) -> CoreResult<Value> {
        let query = Self::required_str(params, "query")?;
        let types: Option<Vec<EntityType>> = params.get("entity_types").and_then(Value::as_array).map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .filter_map(EntityType::from_str)
                .collect()
        });
        let limit = self.clamp_limit(params, 100);

        let index = self.index.read().unwrap();
        let results = search::search_entities(index.all_entities(), query, types.as_deref(), limit);
        Ok(json!(results))
    }

    fn create_entity(&self, params: &Value) -> CoreResult<Value> {
        let entity_type_str = Self::required_str(params, "entity_type")?;
        let entity_type = EntityType::from_str(entity_type_str)
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown entity_type {entity_type_str}")))?;
        let name = Self::required_str(params, "name")?;
        let user_id = Self::required_str(params, "user_id")?;
        let content = params.get("content").cloned().unwrap_or_else(|| json!({}));

        let now = chrono::Utc::now();
        let entity = Entity {
            entity_id: Uuid::new_v4().to_string(),
            version: Entity::new_version(user_id),
            entity_type,
            name: name.to_string(),
            content,
            source_type: crate::graph::entity::SourceType::Manual,
            user_id: user_id.to_string(),
            parent_versions: vec![],
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.store_entity(entity)?;
        self.index.write().unwrap().apply_entity_write(stored.clone());
        Ok(json!(stored))
    }

    fn create_relationship(&self, params: &Value) -> CoreResult<Value> {
        let from_entity_id = Self::required_str(params, "from_entity_id")?.to_string();
        let to_entity_id = Self::required_str(params, "to_entity_id")?.to_string();
        let rel_type_str = Self::required_str(params, "relationship_type")?;
        let relationship_type = RelationshipType::from_str(rel_type_str)
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown relationship_type {rel_type_str}")))?;
        let user_id = Self::required_str(params, "user_id")?.to_string();
        let properties = params.get("properties").cloned().unwrap_or_else(|| json!({}));

        let from = self
            .store
            .get_entity(&from_entity_id, None)?
            .ok_or_else(|| CoreError::NotFound(format!("entity {from_entity_id}")))?;
        let to = self
            .store
            .get_entity(&to_entity_id, None)?
            .ok_or_else(|| CoreError::NotFound(format!("entity {to_entity_id}")))?;

        let now = chrono::Utc::now();
        let rel = Relationship {
            id: Uuid::new_v4().to_string(),
            from_entity_id,
            from_entity_version: from.version,
            to_entity_id,
            to_entity_version: to.version,
            relationship_type,
            properties,
            user_id,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.store_relationship(rel)?;
        self.index.write().unwrap().apply_relationship_write(stored.clone());
        Ok(json!(stored))
    }

    fn find_path(&self, params: &Value) -> CoreResult<Value> {
        let from_entity_id = Self::required_str(params, "from_entity_id")?;
        let to_entity_id = Self::required_str(params, "to_entity_id")?;
        let max_depth = self.max_depth(params, 20);

        let index = self.index.read().unwrap();
        let path = index.find_path(from_entity_id, to_entity_id, max_depth);
        let enriched: Vec<Value> = path
            .iter()
            .filter_map(|id| index.get_entity(id))
            .map(|e| json!({"entity_id": e.entity_id, "name": e.name, "entity_type": e.entity_type}))
            .collect();

        Ok(json!({ "path": path, "entities": enriched }))
    }

    fn get_entity_details(&self, params: &Value) -> CoreResult<Value> {
        let entity_id = Self::required_str(params, "entity_id")?;
        let include_relationships = params.get("include_relationships").and_then(Value::as_bool).unwrap_or(true);
        let include_connected = params.get("include_connected").and_then(Value::as_bool).unwrap_or(false);

        let index = self.index.read().unwrap();
        let entity = index
            .get_entity(entity_id)
            .ok_or_else(|| CoreError::NotFound(format!("entity {entity_id}")))?;

        let mut result = json!({ "entity": entity });

        if include_relationships {
            let outgoing = index.get_connected_entities(entity_id, None, Direction::Outgoing, 1);
            let incoming = index.get_connected_entities(entity_id, None, Direction::Incoming, 1);
            result["relationships"] = json!({ "outgoing": outgoing, "incoming": incoming });
        }

        if include_connected {
            let connected = index.get_connected_entities(entity_id, None, Direction::Both, 1);
            result["connected"] = json!(connected);
        }

        Ok(result)
    }

    fn find_similar_entities(&self, params: &Value) -> CoreResult<Value> {
        let entity_id = Self::required_str(params, "entity_id")?;
        let threshold = params.get("threshold").and_then(Value::as_f64).unwrap_or(0.7);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CoreError::InvalidInput("threshold must be in [0, 1]".to_string()));
        }
        let limit = self.clamp_limit(params, 50);

        let index = self.index.read().unwrap();
        let reference = index
            .get_entity(entity_id)
            .ok_or_else(|| CoreError::NotFound(format!("entity {entity_id}")))?
            .clone();

        let results = search::find_similar(index.all_entities(), &reference, threshold, limit);
        Ok(json!(results))
    }

    fn get_procedures_for_device(&self, params: &Value) -> CoreResult<Value> {
        let device_id = Self::required_str(params, "device_id")?;
        let index = self.index.read().unwrap();
        let device = index
            .get_entity(device_id)
            .ok_or_else(|| CoreError::NotFound(format!("device {device_id}")))?;
        if device.entity_type != EntityType::Device {
            return Err(CoreError::InvalidInput(format!("{device_id} is not a device")));
        }

        let docs: Vec<&Entity> = index
            .get_connected_entities(device_id, Some(RelationshipType::DocumentedBy), Direction::Outgoing, 1)
            .into_iter()
            .filter_map(|conn| index.get_entity(&conn.entity.entity_id))
            .filter(|e| matches!(e.entity_type, EntityType::Procedure | EntityType::Manual))
            .collect();

        Ok(json!(docs))
    }

    fn get_automations_in_room(&self, params: &Value) -> CoreResult<Value> {
        let room_id = Self::required_str(params, "room_id")?;
        let index = self.index.read().unwrap();
        index
            .get_entity(room_id)
            .ok_or_else(|| CoreError::NotFound(format!("room {room_id}")))?;

        let devices_in_room: Vec<String> = index
            .get_connected_entities(room_id, Some(RelationshipType::LocatedIn), Direction::Incoming, 1)
            .into_iter()
            .map(|c| c.entity.entity_id)
            .collect();

        let mut automations: Vec<&Entity> = Vec::new();
        for device_id in &devices_in_room {
            for conn in index.get_connected_entities(device_id, Some(RelationshipType::Controls), Direction::Incoming, 1) {
                if let Some(entity) = index.get_entity(&conn.entity.entity_id) {
                    if entity.entity_type == EntityType::Automation
                        && !automations.iter().any(|a| a.entity_id == entity.entity_id)
                    {
                        automations.push(entity);
                    }
                }
            }
        }

        Ok(json!(automations))
    }

    fn update_entity(&self, params: &Value) -> CoreResult<Value> {
        let entity_id = Self::required_str(params, "entity_id")?;
        let changes = params
            .get("changes")
            .ok_or_else(|| CoreError::InvalidInput("changes is required".to_string()))?;
        let user_id = Self::required_str(params, "user_id")?;

        let current = self
            .store
            .get_entity(entity_id, None)?
            .ok_or_else(|| CoreError::NotFound(format!("entity {entity_id}")))?;

        let mut content = current.content.clone();
        if let Some(content_updates) = changes.get("content").and_then(Value::as_object) {
            let target = content.as_object_mut().ok_or_else(|| {
                CoreError::InvalidInput("existing content is not a mapping".to_string())
            })?;
            for (k, v) in content_updates {
                target.insert(k.clone(), v.clone());
            }
        }
        let name = changes
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| current.name.clone());

        let now = chrono::Utc::now();
        let next = Entity {
            entity_id: entity_id.to_string(),
            version: Entity::new_version(user_id),
            entity_type: current.entity_type,
            name,
            content,
            source_type: current.source_type,
            user_id: user_id.to_string(),
            parent_versions: vec![current.version],
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.store_entity(next)?;
        self.index.write().unwrap().apply_entity_write(stored.clone());
        Ok(json!(stored))
    }
}
