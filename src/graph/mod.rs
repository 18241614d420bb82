pub mod blob;
pub mod entity;
pub mod index;
pub mod relationship;
pub mod store;

pub use blob::{Blob, BlobSyncStatus, BlobType};
pub use entity::{Entity, EntityType, SourceType};
pub use index::GraphIndex;
pub use relationship::{Relationship, RelationshipType};
pub use store::GraphStore;
