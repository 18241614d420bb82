use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of entity types the graph can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Home,
    Room,
    Device,
    Zone,
    Door,
    Window,
    Procedure,
    Manual,
    Note,
    Schedule,
    Automation,
    App,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Home => "home",
            EntityType::Room => "room",
            EntityType::Device => "device",
            EntityType::Zone => "zone",
            EntityType::Door => "door",
            EntityType::Window => "window",
            EntityType::Procedure => "procedure",
            EntityType::Manual => "manual",
            EntityType::Note => "note",
            EntityType::Schedule => "schedule",
            EntityType::Automation => "automation",
            EntityType::App => "app",
        }
    }

    pub fn all() -> &'static [EntityType] {
        &[
            EntityType::Home,
            EntityType::Room,
            EntityType::Device,
            EntityType::Zone,
            EntityType::Door,
            EntityType::Window,
            EntityType::Procedure,
            EntityType::Manual,
            EntityType::Note,
            EntityType::Schedule,
            EntityType::Automation,
            EntityType::App,
        ]
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.as_str() == s)
    }
}

/// Provenance tag recorded on every entity version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Manual,
    Homekit,
    Imported,
    Generated,
}

/// An immutable, versioned entity record. Identity is the pair
/// `(entity_id, version)`; `version` has the shape
/// `<rfc3339-timestamp>-<user_id>` and is produced once at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    pub version: String,
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default = "default_content")]
    pub content: Value,
    pub source_type: SourceType,
    pub user_id: String,
    #[serde(default)]
    pub parent_versions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_content() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Entity {
    /// Build the version string for a new record authored right now.
    pub fn new_version(user_id: &str) -> String {
        format!("{}-{}", Utc::now().to_rfc3339(), user_id)
    }

    /// Whether this version is a tombstone, per the fixed
    /// `content.deleted = true` convention.
    pub fn is_deleted(&self) -> bool {
        self.content
            .get("deleted")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_round_trips_through_str() {
        for ty in EntityType::all() {
            assert_eq!(EntityType::from_str(ty.as_str()), Some(*ty));
        }
    }

    #[test]
    fn entity_type_serializes_lowercase() {
        let json = serde_json::to_string(&EntityType::Device).unwrap();
        assert_eq!(json, "\"device\"");
    }

    #[test]
    fn tombstone_detected_via_content_flag() {
        let mut entity = sample_entity();
        assert!(!entity.is_deleted());
        entity.content = serde_json::json!({"deleted": true});
        assert!(entity.is_deleted());
    }

    fn sample_entity() -> Entity {
        let now = Utc::now();
        Entity {
            entity_id: "e1".to_string(),
            version: Entity::new_version("u1"),
            entity_type: EntityType::Device,
            name: "Smart TV".to_string(),
            content: serde_json::json!({"brand": "X"}),
            source_type: SourceType::Manual,
            user_id: "u1".to_string(),
            parent_versions: vec![],
            created_at: now,
            updated_at: now,
        }
    }
}
