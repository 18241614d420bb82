use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::EntityType;

/// The closed set of relationship (edge) types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    LocatedIn,
    Controls,
    ConnectsTo,
    PartOf,
    Manages,
    DocumentedBy,
    ProcedureFor,
    TriggeredBy,
    DependsOn,
    ContainedIn,
    Monitors,
    Automates,
    ControlledByApp,
    HasBlob,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::LocatedIn => "located_in",
            RelationshipType::Controls => "controls",
            RelationshipType::ConnectsTo => "connects_to",
            RelationshipType::PartOf => "part_of",
            RelationshipType::Manages => "manages",
            RelationshipType::DocumentedBy => "documented_by",
            RelationshipType::ProcedureFor => "procedure_for",
            RelationshipType::TriggeredBy => "triggered_by",
            RelationshipType::DependsOn => "depends_on",
            RelationshipType::ContainedIn => "contained_in",
            RelationshipType::Monitors => "monitors",
            RelationshipType::Automates => "automates",
            RelationshipType::ControlledByApp => "controlled_by_app",
            RelationshipType::HasBlob => "has_blob",
        }
    }

    /// Whether `(from_type, to_type)` is an admissible endpoint pair for this
    /// relationship type. Enforced on every `store_relationship` call.
    pub fn allows(&self, from_type: EntityType, to_type: EntityType) -> bool {
        use EntityType::*;
        match self {
            RelationshipType::LocatedIn => {
                matches!(from_type, Device | Room) && matches!(to_type, Room | Zone | Home)
            }
            RelationshipType::Controls => {
                matches!(from_type, Device | Automation) && to_type == Device
            }
            RelationshipType::ConnectsTo => matches!(from_type, Room | Door | Window)
                && matches!(to_type, Room | Door | Window),
            RelationshipType::PartOf => {
                matches!(from_type, Room | Zone | Device) && matches!(to_type, Home | Zone)
            }
            RelationshipType::Manages => {
                matches!(from_type, Automation | App) && matches!(to_type, Device | Zone | Room)
            }
            RelationshipType::DocumentedBy => {
                from_type == Device && matches!(to_type, Manual | Procedure | Note)
            }
            RelationshipType::ProcedureFor => {
                from_type == Procedure && matches!(to_type, Device | Room | Home)
            }
            RelationshipType::TriggeredBy => {
                from_type == Automation && matches!(to_type, Device | Schedule)
            }
            RelationshipType::DependsOn => {
                matches!(from_type, Automation | Device) && matches!(to_type, Device | Automation)
            }
            RelationshipType::ContainedIn => {
                matches!(from_type, Room | Device | Zone) && matches!(to_type, Home | Zone | Room)
            }
            RelationshipType::Monitors => from_type == Device && matches!(to_type, Room | Zone),
            RelationshipType::Automates => {
                from_type == Automation && matches!(to_type, Device | Room | Zone)
            }
            RelationshipType::ControlledByApp => from_type == Device && to_type == App,
            // HAS_BLOB links any entity to a blob's carrier entity; blobs are
            // stored out-of-band, so both endpoints are permitted freely.
            RelationshipType::HasBlob => true,
        }
    }

    pub fn all() -> &'static [RelationshipType] {
        use RelationshipType::*;
        &[
            LocatedIn, Controls, ConnectsTo, PartOf, Manages, DocumentedBy, ProcedureFor,
            TriggeredBy, DependsOn, ContainedIn, Monitors, Automates, ControlledByApp, HasBlob,
        ]
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.as_str() == s)
    }
}

/// A typed directed edge between two specific entity *versions*.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub from_entity_id: String,
    pub from_entity_version: String,
    pub to_entity_id: String,
    pub to_entity_version: String,
    pub relationship_type: RelationshipType,
    #[serde(default = "default_properties")]
    pub properties: Value,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_properties() -> Value {
    Value::Object(serde_json::Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use EntityType::*;

    #[test]
    fn located_in_allows_device_to_room() {
        assert!(RelationshipType::LocatedIn.allows(Device, Room));
        assert!(RelationshipType::LocatedIn.allows(Room, Zone));
        assert!(!RelationshipType::LocatedIn.allows(Room, Device));
    }

    #[test]
    fn controls_requires_device_target() {
        assert!(RelationshipType::Controls.allows(Automation, Device));
        assert!(!RelationshipType::Controls.allows(Automation, Room));
    }

    #[test]
    fn controlled_by_app_is_device_to_app_only() {
        assert!(RelationshipType::ControlledByApp.allows(Device, App));
        assert!(!RelationshipType::ControlledByApp.allows(App, Device));
    }

    #[test]
    fn documented_by_admits_manual_procedure_note() {
        assert!(RelationshipType::DocumentedBy.allows(Device, Manual));
        assert!(RelationshipType::DocumentedBy.allows(Device, Procedure));
        assert!(RelationshipType::DocumentedBy.allows(Device, Note));
        assert!(!RelationshipType::DocumentedBy.allows(Device, Room));
    }

    #[test]
    fn has_blob_is_unrestricted() {
        assert!(RelationshipType::HasBlob.allows(Home, Note));
        assert!(RelationshipType::HasBlob.allows(Device, Device));
    }
}
