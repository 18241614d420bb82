use serde_json::{json, Value};

/// The fixed 12-tool catalog, one JSON-schema entry per dispatchable tool
/// name. Closed set: `dispatch` rejects anything not listed here.
pub const TOOL_NAMES: &[&str] = &[
    "get_devices_in_room",
    "find_device_controls",
    "get_room_connections",
    "search_entities",
    "create_entity",
    "create_relationship",
    "find_path",
    "get_entity_details",
    "find_similar_entities",
    "get_procedures_for_device",
    "get_automations_in_room",
    "update_entity",
];

/// Returns the MCP-style tool catalog as a JSON array of
/// `{name, description, parameters}` entries, suitable for a `list_tools`
/// response or for the `available_tools` field of an error envelope.
pub fn catalog() -> Value {
    json!([
        {
            "name": "get_devices_in_room",
            "description": "Get all devices located in a specific room",
            "parameters": {
                "type": "object",
                "properties": {
                    "room_id": { "type": "string", "description": "The ID of the room entity" }
                },
                "required": ["room_id"]
            }
        },
        {
            "name": "find_device_controls",
            "description": "Get available controls and services for a device",
            "parameters": {
                "type": "object",
                "properties": {
                    "device_id": { "type": "string", "description": "The ID of the device entity" }
                },
                "required": ["device_id"]
            }
        },
        {
            "name": "get_room_connections",
            "description": "Find doors, windows, and passages between rooms",
            "parameters": {
                "type": "object",
                "properties": {
                    "room_id": { "type": "string", "description": "The ID of the room entity" }
                },
                "required": ["room_id"]
            }
        },
        {
            "name": "search_entities",
            "description": "Search for entities by name or content",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query string" },
                    "entity_types": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Filter by entity types (optional)"
                    },
                    "limit": { "type": "integer", "description": "Maximum number of results", "default": 10 }
                },
                "required": ["query"]
            }
        },
        {
            "name": "create_entity",
            "description": "Create a new entity in the knowledge graph",
            "parameters": {
                "type": "object",
                "properties": {
                    "entity_type": { "type": "string", "description": "Type of entity to create" },
                    "name": { "type": "string", "description": "Name of the entity" },
                    "content": {
                        "type": "object",
                        "description": "Additional properties for the entity",
                        "additionalProperties": true
                    },
                    "user_id": { "type": "string", "description": "ID of the user creating the entity" }
                },
                "required": ["entity_type", "name", "user_id"]
            }
        },
        {
            "name": "create_relationship",
            "description": "Create a relationship between two entities",
            "parameters": {
                "type": "object",
                "properties": {
                    "from_entity_id": { "type": "string", "description": "ID of the source entity" },
                    "to_entity_id": { "type": "string", "description": "ID of the target entity" },
                    "relationship_type": { "type": "string", "description": "Type of relationship" },
                    "properties": {
                        "type": "object",
                        "description": "Additional properties for the relationship",
                        "additionalProperties": true
                    },
                    "user_id": { "type": "string", "description": "ID of the user creating the relationship" }
                },
                "required": ["from_entity_id", "to_entity_id", "relationship_type", "user_id"]
            }
        },
        {
            "name": "find_path",
            "description": "Find the shortest path between two entities",
            "parameters": {
                "type": "object",
                "properties": {
                    "from_entity_id": { "type": "string", "description": "Starting entity ID" },
                    "to_entity_id": { "type": "string", "description": "Target entity ID" },
                    "max_depth": { "type": "integer", "description": "Maximum search depth", "default": 10 }
                },
                "required": ["from_entity_id", "to_entity_id"]
            }
        },
        {
            "name": "get_entity_details",
            "description": "Get detailed information about an entity",
            "parameters": {
                "type": "object",
                "properties": {
                    "entity_id": { "type": "string", "description": "The ID of the entity" },
                    "include_relationships": {
                        "type": "boolean",
                        "description": "Include incoming and outgoing relationships",
                        "default": true
                    },
                    "include_connected": {
                        "type": "boolean",
                        "description": "Include directly connected entities",
                        "default": false
                    }
                },
                "required": ["entity_id"]
            }
        },
        {
            "name": "find_similar_entities",
            "description": "Find entities similar to a given entity",
            "parameters": {
                "type": "object",
                "properties": {
                    "entity_id": { "type": "string", "description": "Reference entity ID" },
                    "threshold": {
                        "type": "number",
                        "description": "Similarity threshold (0-1)",
                        "default": 0.7,
                        "minimum": 0,
                        "maximum": 1
                    },
                    "limit": { "type": "integer", "description": "Maximum number of results", "default": 10 }
                },
                "required": ["entity_id"]
            }
        },
        {
            "name": "get_procedures_for_device",
            "description": "Get all procedures and manuals for a specific device",
            "parameters": {
                "type": "object",
                "properties": {
                    "device_id": { "type": "string", "description": "The ID of the device" }
                },
                "required": ["device_id"]
            }
        },
        {
            "name": "get_automations_in_room",
            "description": "Get all automations that affect devices in a room",
            "parameters": {
                "type": "object",
                "properties": {
                    "room_id": { "type": "string", "description": "The ID of the room" }
                },
                "required": ["room_id"]
            }
        },
        {
            "name": "update_entity",
            "description": "Update an entity (creates new version)",
            "parameters": {
                "type": "object",
                "properties": {
                    "entity_id": { "type": "string", "description": "The ID of the entity to update" },
                    "changes": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string", "description": "New name (optional)" },
                            "content": {
                                "type": "object",
                                "description": "Content updates (merged with existing)",
                                "additionalProperties": true
                            }
                        }
                    },
                    "user_id": { "type": "string", "description": "ID of the user making the change" }
                },
                "required": ["entity_id", "changes", "user_id"]
            }
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_exactly_the_closed_tool_set() {
        let names: Vec<String> = catalog()
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names.len(), TOOL_NAMES.len());
        for name in TOOL_NAMES {
            assert!(names.contains(&name.to_string()), "missing {name}");
        }
    }
}
