pub mod conflict;
pub mod engine;
pub mod protocol;
pub mod transport;

pub use conflict::{resolve_conflict, ConflictRecord, ConflictResolution, Side};
pub use engine::{SyncEngine, SyncReceiver, SyncState};
pub use protocol::{
    ChangeType, ConflictInfo, EntityChange, RelationshipChange, SyncChange, SyncFilters,
    SyncRequest, SyncResponse, SyncStats, SyncType, PROTOCOL_VERSION,
};
pub use transport::{HttpSyncTransport, SyncTransport};
