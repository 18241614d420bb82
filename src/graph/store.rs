use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{CoreError, Result};

use super::blob::{Blob, BlobSyncStatus, BlobType};
use super::entity::{Entity, EntityType, SourceType};
use super::relationship::{Relationship, RelationshipType};

/// Durable storage for entities, relationships, and blobs. Mirrors the
/// teacher's single-connection-behind-a-mutex store, plus a `latest_version`
/// side table updated in the same transaction as every `store_entity` append,
/// and a per-entity lock map so concurrent callers cannot interleave a
/// read-latest/append-version sequence for the same `entity_id`.
pub struct GraphStore {
    conn: Mutex<Connection>,
    entity_locks: DashMap<String, Mutex<()>>,
}

impl GraphStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            entity_locks: DashMap::new(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            entity_locks: DashMap::new(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entities (
                entity_id TEXT NOT NULL,
                version TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                name TEXT NOT NULL,
                content TEXT NOT NULL,
                source_type TEXT NOT NULL,
                user_id TEXT NOT NULL,
                parent_versions TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (entity_id, version)
            );
            CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
            CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);

            CREATE TABLE IF NOT EXISTS latest_version (
                entity_id TEXT PRIMARY KEY,
                version TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entity_relationships (
                id TEXT PRIMARY KEY,
                from_entity_id TEXT NOT NULL,
                from_entity_version TEXT NOT NULL,
                to_entity_id TEXT NOT NULL,
                to_entity_version TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                properties TEXT NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rel_from ON entity_relationships(from_entity_id);
            CREATE INDEX IF NOT EXISTS idx_rel_to ON entity_relationships(to_entity_id);
            CREATE INDEX IF NOT EXISTS idx_rel_type ON entity_relationships(relationship_type);

            CREATE TABLE IF NOT EXISTS blobs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                blob_type TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size INTEGER NOT NULL,
                data BLOB NOT NULL,
                blob_metadata TEXT NOT NULL,
                checksum TEXT NOT NULL,
                sync_status TEXT NOT NULL,
                server_url TEXT,
                last_sync_at TEXT,
                user_id TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_metadata (
                client_id TEXT PRIMARY KEY,
                last_sync_time TEXT,
                last_sync_success TEXT,
                last_sync_error TEXT,
                sync_failures INTEGER NOT NULL DEFAULT 0,
                total_syncs INTEGER NOT NULL DEFAULT 0,
                total_conflicts INTEGER NOT NULL DEFAULT 0,
                sync_in_progress INTEGER NOT NULL DEFAULT 0,
                next_retry_time TEXT,
                vector_clock TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS client_sync_tracking (
                entity_id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                sync_status TEXT NOT NULL,
                operation TEXT NOT NULL,
                entity_updated_at TEXT NOT NULL,
                last_sync_at TEXT,
                conflict_reason TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0
            );",
        )?;
        // Idempotent migrations for columns added after the original schema;
        // failures are ignored since the column may already exist.
        let _ = conn.execute(
            "ALTER TABLE blobs ADD COLUMN server_url TEXT",
            [],
        );
        Ok(())
    }

    fn lock_for(&self, entity_id: &str) -> dashmap::mapref::one::Ref<'_, String, Mutex<()>> {
        self.entity_locks
            .entry(entity_id.to_string())
            .or_insert_with(|| Mutex::new(()));
        self.entity_locks.get(entity_id).unwrap()
    }

    // ---- Entities --------------------------------------------------

    /// Append a new version. Fails with `INVALID_PARENT`-flavored
    /// `InvalidInput` if a parent version does not resolve, and with
    /// `DuplicateVersion` if `(entity_id, version)` already exists.
    pub fn store_entity(&self, entity: Entity) -> Result<Entity> {
        let guard = self.lock_for(&entity.entity_id);
        let _held = guard.lock().unwrap();

        let conn = self.conn.lock().unwrap();

        let exists: Option<String> = conn
            .query_row(
                "SELECT version FROM entities WHERE entity_id = ?1 AND version = ?2",
                params![entity.entity_id, entity.version],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(CoreError::DuplicateVersion(format!(
                "{}/{}",
                entity.entity_id, entity.version
            )));
        }

        for parent in &entity.parent_versions {
            let found: Option<String> = conn
                .query_row(
                    "SELECT version FROM entities WHERE entity_id = ?1 AND version = ?2",
                    params![entity.entity_id, parent],
                    |row| row.get(0),
                )
                .optional()?;
            if found.is_none() {
                return Err(CoreError::InvalidInput(format!(
                    "parent version {} does not exist for entity {}",
                    parent, entity.entity_id
                )));
            }
        }

        let parent_json = serde_json::to_string(&entity.parent_versions)?;
        conn.execute(
            "INSERT INTO entities
                (entity_id, version, entity_type, name, content, source_type,
                 user_id, parent_versions, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entity.entity_id,
                entity.version,
                entity.entity_type.as_str(),
                entity.name,
                entity.content.to_string(),
                source_type_str(entity.source_type),
                entity.user_id,
                parent_json,
                entity.created_at.to_rfc3339(),
                entity.updated_at.to_rfc3339(),
            ],
        )?;

        // Maintain `latest_version` inside the caller's serialized section;
        // only replace it if this version's created_at is not older than
        // whatever is recorded (ties broken by lexicographic version, per
        // the latest-version-selection algorithm).
        let current_latest: Option<String> = conn
            .query_row(
                "SELECT version FROM latest_version WHERE entity_id = ?1",
                params![entity.entity_id],
                |row| row.get(0),
            )
            .optional()?;

        let should_replace = match &current_latest {
            None => true,
            Some(current) => {
                let current_entity = read_entity(&conn, &entity.entity_id, current)?;
                is_newer(&entity, &current_entity)
            }
        };

        if should_replace {
            conn.execute(
                "INSERT INTO latest_version (entity_id, version) VALUES (?1, ?2)
                 ON CONFLICT(entity_id) DO UPDATE SET version = excluded.version",
                params![entity.entity_id, entity.version],
            )?;
        }

        Ok(entity)
    }

    /// Exact version if given, else the latest version for `entity_id`.
    pub fn get_entity(&self, entity_id: &str, version: Option<&str>) -> Result<Option<Entity>> {
        let conn = self.conn.lock().unwrap();
        match version {
            Some(v) => {
                let found = read_entity(&conn, entity_id, v).optional_not_found()?;
                Ok(found)
            }
            None => {
                let latest: Option<String> = conn
                    .query_row(
                        "SELECT version FROM latest_version WHERE entity_id = ?1",
                        params![entity_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                match latest {
                    Some(v) => Ok(Some(read_entity(&conn, entity_id, &v)?)),
                    None => Ok(None),
                }
            }
        }
    }

    /// All versions of `entity_id`, ordered by `created_at` ascending.
    pub fn get_entity_versions(&self, entity_id: &str) -> Result<Vec<Entity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT entity_id, version, entity_type, name, content, source_type,
                    user_id, parent_versions, created_at, updated_at
             FROM entities WHERE entity_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![entity_id], row_to_entity)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Latest version of every entity whose latest-version type matches.
    pub fn get_entities_by_type(&self, entity_type: EntityType) -> Result<Vec<Entity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT e.entity_id, e.version, e.entity_type, e.name, e.content, e.source_type,
                    e.user_id, e.parent_versions, e.created_at, e.updated_at
             FROM entities e
             JOIN latest_version lv ON lv.entity_id = e.entity_id AND lv.version = e.version
             WHERE e.entity_type = ?1",
        )?;
        let rows = stmt.query_map(params![entity_type.as_str()], row_to_entity)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Substring match against `name` (case-insensitive), over latest
    /// versions only.
    pub fn search_entities(
        &self,
        query: &str,
        types: Option<&[EntityType]>,
        limit: usize,
    ) -> Result<Vec<Entity>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{}%", query.to_lowercase());
        let mut stmt = conn.prepare(
            "SELECT e.entity_id, e.version, e.entity_type, e.name, e.content, e.source_type,
                    e.user_id, e.parent_versions, e.created_at, e.updated_at
             FROM entities e
             JOIN latest_version lv ON lv.entity_id = e.entity_id AND lv.version = e.version
             WHERE LOWER(e.name) LIKE ?1
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit as i64], row_to_entity)?;
        let mut out = Vec::new();
        for row in rows {
            let entity = row?;
            if types.map(|ts| ts.contains(&entity.entity_type)).unwrap_or(true) {
                out.push(entity);
            }
        }
        Ok(out)
    }

    // ---- Relationships -----------------------------------------------

    pub fn store_relationship(&self, rel: Relationship) -> Result<Relationship> {
        let from = self
            .get_entity(&rel.from_entity_id, Some(&rel.from_entity_version))?
            .ok_or_else(|| {
                CoreError::InvalidInput(format!(
                    "dangling endpoint {}/{}",
                    rel.from_entity_id, rel.from_entity_version
                ))
            })?;
        let to = self
            .get_entity(&rel.to_entity_id, Some(&rel.to_entity_version))?
            .ok_or_else(|| {
                CoreError::InvalidInput(format!(
                    "dangling endpoint {}/{}",
                    rel.to_entity_id, rel.to_entity_version
                ))
            })?;

        if !rel.relationship_type.allows(from.entity_type, to.entity_type) {
            return Err(CoreError::InvalidRelationship(format!(
                "{} does not admit {:?} -> {:?}",
                rel.relationship_type.as_str(),
                from.entity_type,
                to.entity_type
            )));
        }

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO entity_relationships
                (id, from_entity_id, from_entity_version, to_entity_id, to_entity_version,
                 relationship_type, properties, user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                rel.id,
                rel.from_entity_id,
                rel.from_entity_version,
                rel.to_entity_id,
                rel.to_entity_version,
                rel.relationship_type.as_str(),
                rel.properties.to_string(),
                rel.user_id,
                rel.created_at.to_rfc3339(),
                rel.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(rel)
    }

    /// Filtered scan; when `include_all_versions` is false, only edges whose
    /// endpoint versions equal the current latest are returned.
    pub fn get_relationships(
        &self,
        from_id: Option<&str>,
        to_id: Option<&str>,
        rel_type: Option<RelationshipType>,
        include_all_versions: bool,
    ) -> Result<Vec<Relationship>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, from_entity_id, from_entity_version, to_entity_id, to_entity_version,
                    relationship_type, properties, user_id, created_at, updated_at
             FROM entity_relationships",
        )?;
        let rows = stmt.query_map([], row_to_relationship)?;
        let mut out = Vec::new();
        for row in rows {
            let rel = row?;
            if let Some(f) = from_id {
                if rel.from_entity_id != f {
                    continue;
                }
            }
            if let Some(t) = to_id {
                if rel.to_entity_id != t {
                    continue;
                }
            }
            if let Some(rt) = rel_type {
                if rel.relationship_type != rt {
                    continue;
                }
            }
            if !include_all_versions {
                let from_latest: Option<String> = conn
                    .query_row(
                        "SELECT version FROM latest_version WHERE entity_id = ?1",
                        params![rel.from_entity_id],
                        |r| r.get(0),
                    )
                    .optional()?;
                let to_latest: Option<String> = conn
                    .query_row(
                        "SELECT version FROM latest_version WHERE entity_id = ?1",
                        params![rel.to_entity_id],
                        |r| r.get(0),
                    )
                    .optional()?;
                if from_latest.as_deref() != Some(rel.from_entity_version.as_str())
                    || to_latest.as_deref() != Some(rel.to_entity_version.as_str())
                {
                    continue;
                }
            }
            out.push(rel);
        }
        Ok(out)
    }

    // ---- Blobs ---------------------------------------------------------

    pub fn put_blob(&self, blob: Blob) -> Result<Blob> {
        if !blob.is_consistent() {
            return Err(CoreError::InvalidInput(format!(
                "checksum mismatch for blob {}",
                blob.id
            )));
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO blobs
                (id, name, blob_type, mime_type, size, data, blob_metadata, checksum,
                 sync_status, server_url, last_sync_at, user_id)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)
             ON CONFLICT(id) DO UPDATE SET
                name=excluded.name, blob_type=excluded.blob_type, mime_type=excluded.mime_type,
                size=excluded.size, data=excluded.data, blob_metadata=excluded.blob_metadata,
                checksum=excluded.checksum, sync_status=excluded.sync_status,
                server_url=excluded.server_url, last_sync_at=excluded.last_sync_at",
            params![
                blob.id,
                blob.name,
                blob_type_str(blob.blob_type),
                blob.mime_type,
                blob.size as i64,
                blob.data,
                blob.blob_metadata.to_string(),
                blob.checksum,
                sync_status_str(blob.sync_status),
                blob.server_url,
                blob.last_sync_at.map(|t| t.to_rfc3339()),
                blob.user_id,
            ],
        )?;
        Ok(blob)
    }

    pub fn get_blob(&self, id: &str) -> Result<Option<Blob>> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT id, name, blob_type, mime_type, size, data, blob_metadata, checksum,
                        sync_status, server_url, last_sync_at, user_id
                 FROM blobs WHERE id = ?1",
                params![id],
                row_to_blob,
            )
            .optional()?;
        Ok(found)
    }
}

trait OptionalNotFound<T> {
    fn optional_not_found(self) -> Result<Option<T>>;
}

impl OptionalNotFound<Entity> for Result<Entity> {
    fn optional_not_found(self) -> Result<Option<Entity>> {
        match self {
            Ok(e) => Ok(Some(e)),
            Err(CoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn is_newer(candidate: &Entity, current: &Entity) -> bool {
    if candidate.created_at != current.created_at {
        candidate.created_at > current.created_at
    } else {
        candidate.version > current.version
    }
}

fn read_entity(conn: &Connection, entity_id: &str, version: &str) -> Result<Entity> {
    conn.query_row(
        "SELECT entity_id, version, entity_type, name, content, source_type,
                user_id, parent_versions, created_at, updated_at
         FROM entities WHERE entity_id = ?1 AND version = ?2",
        params![entity_id, version],
        row_to_entity,
    )
    .map_err(CoreError::from)
}

fn row_to_entity(row: &rusqlite::Row) -> rusqlite::Result<Entity> {
    let entity_type_str: String = row.get(2)?;
    let content_str: String = row.get(4)?;
    let source_type_s: String = row.get(5)?;
    let parent_versions_str: String = row.get(7)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    Ok(Entity {
        entity_id: row.get(0)?,
        version: row.get(1)?,
        entity_type: parse_entity_type(&entity_type_str),
        name: row.get(3)?,
        content: serde_json::from_str(&content_str).unwrap_or(serde_json::Value::Null),
        source_type: parse_source_type(&source_type_s),
        user_id: row.get(6)?,
        parent_versions: serde_json::from_str(&parent_versions_str).unwrap_or_default(),
        created_at: parse_rfc3339(&created_at_str),
        updated_at: parse_rfc3339(&updated_at_str),
    })
}

fn row_to_relationship(row: &rusqlite::Row) -> rusqlite::Result<Relationship> {
    let rel_type_str: String = row.get(5)?;
    let properties_str: String = row.get(6)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    Ok(Relationship {
        id: row.get(0)?,
        from_entity_id: row.get(1)?,
        from_entity_version: row.get(2)?,
        to_entity_id: row.get(3)?,
        to_entity_version: row.get(4)?,
        relationship_type: parse_relationship_type(&rel_type_str),
        properties: serde_json::from_str(&properties_str).unwrap_or(serde_json::Value::Null),
        user_id: row.get(7)?,
        created_at: parse_rfc3339(&created_at_str),
        updated_at: parse_rfc3339(&updated_at_str),
    })
}

fn row_to_blob(row: &rusqlite::Row) -> rusqlite::Result<Blob> {
    let blob_type_s: String = row.get(2)?;
    let sync_status_s: String = row.get(8)?;
    let metadata_str: String = row.get(6)?;
    let last_sync_at: Option<String> = row.get(10)?;

    Ok(Blob {
        id: row.get(0)?,
        name: row.get(1)?,
        blob_type: parse_blob_type(&blob_type_s),
        mime_type: row.get(3)?,
        size: row.get::<_, i64>(4)? as u64,
        data: row.get(5)?,
        blob_metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::Value::Null),
        checksum: row.get(7)?,
        sync_status: parse_sync_status(&sync_status_s),
        server_url: row.get(9)?,
        last_sync_at: last_sync_at.map(|s| parse_rfc3339(&s)),
        user_id: row.get(11)?,
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_entity_type(s: &str) -> EntityType {
    EntityType::from_str(s).unwrap_or(EntityType::Note)
}

fn parse_relationship_type(s: &str) -> RelationshipType {
    RelationshipType::from_str(s).unwrap_or(RelationshipType::HasBlob)
}

fn parse_source_type(s: &str) -> SourceType {
    match s {
        "homekit" => SourceType::Homekit,
        "imported" => SourceType::Imported,
        "generated" => SourceType::Generated,
        _ => SourceType::Manual,
    }
}

fn source_type_str(s: SourceType) -> &'static str {
    match s {
        SourceType::Manual => "manual",
        SourceType::Homekit => "homekit",
        SourceType::Imported => "imported",
        SourceType::Generated => "generated",
    }
}

fn parse_blob_type(s: &str) -> BlobType {
    match s {
        "jpeg" => BlobType::Jpeg,
        "png" => BlobType::Png,
        "binary" => BlobType::Binary,
        _ => BlobType::Pdf,
    }
}

fn blob_type_str(t: BlobType) -> &'static str {
    match t {
        BlobType::Pdf => "pdf",
        BlobType::Jpeg => "jpeg",
        BlobType::Png => "png",
        BlobType::Binary => "binary",
    }
}

fn parse_sync_status(s: &str) -> BlobSyncStatus {
    match s {
        "uploaded" => BlobSyncStatus::Uploaded,
        "downloaded" => BlobSyncStatus::Downloaded,
        "failed" => BlobSyncStatus::Failed,
        _ => BlobSyncStatus::PendingUpload,
    }
}

fn sync_status_str(s: BlobSyncStatus) -> &'static str {
    match s {
        BlobSyncStatus::PendingUpload => "pending_upload",
        BlobSyncStatus::Uploaded => "uploaded",
        BlobSyncStatus::Downloaded => "downloaded",
        BlobSyncStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str, user: &str, parents: Vec<String>) -> Entity {
        let now = Utc::now();
        Entity {
            entity_id: id.to_string(),
            version: Entity::new_version(user),
            entity_type: EntityType::Device,
            name: "Smart TV".to_string(),
            content: serde_json::json!({"brand": "X"}),
            source_type: SourceType::Manual,
            user_id: user.to_string(),
            parent_versions: parents,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn store_and_read_back_latest() {
        let store = GraphStore::open_in_memory().unwrap();
        let e = entity("e1", "u1", vec![]);
        let stored = store.store_entity(e.clone()).unwrap();
        let latest = store.get_entity("e1", None).unwrap().unwrap();
        assert_eq!(latest.version, stored.version);
        assert_eq!(latest.content["brand"], "X");
    }

    #[test]
    fn duplicate_version_rejected() {
        let store = GraphStore::open_in_memory().unwrap();
        let e = entity("e1", "u1", vec![]);
        store.store_entity(e.clone()).unwrap();
        let err = store.store_entity(e).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateVersion(_)));
    }

    #[test]
    fn missing_parent_rejected() {
        let store = GraphStore::open_in_memory().unwrap();
        let e = entity("e1", "u1", vec!["nonexistent-version".to_string()]);
        let err = store.store_entity(e).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn update_creates_second_version_with_parent() {
        let store = GraphStore::open_in_memory().unwrap();
        let v1 = entity("e1", "u1", vec![]);
        let v1 = store.store_entity(v1).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2));
        let mut v2 = entity("e1", "u1", vec![v1.version.clone()]);
        v2.content = serde_json::json!({"brand": "Y"});
        store.store_entity(v2.clone()).unwrap();

        let versions = store.get_entity_versions("e1").unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].parent_versions, vec![v1.version]);

        let latest = store.get_entity("e1", None).unwrap().unwrap();
        assert_eq!(latest.content["brand"], "Y");
    }

    #[test]
    fn relationship_type_mismatch_rejected() {
        let store = GraphStore::open_in_memory().unwrap();
        let mut room = entity("r1", "u1", vec![]);
        room.entity_type = EntityType::Room;
        store.store_entity(room.clone()).unwrap();
        let mut room2 = entity("r2", "u1", vec![]);
        room2.entity_type = EntityType::Room;
        store.store_entity(room2.clone()).unwrap();

        let rel = Relationship {
            id: "rel1".to_string(),
            from_entity_id: room.entity_id.clone(),
            from_entity_version: room.version.clone(),
            to_entity_id: room2.entity_id.clone(),
            to_entity_version: room2.version.clone(),
            relationship_type: RelationshipType::Controls,
            properties: serde_json::json!({}),
            user_id: "u1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let err = store.store_relationship(rel).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRelationship(_)));
    }

    #[test]
    fn blob_checksum_enforced_on_write() {
        let store = GraphStore::open_in_memory().unwrap();
        let mut blob = Blob::new(
            "b1".to_string(),
            "manual.pdf".to_string(),
            BlobType::Pdf,
            "application/pdf".to_string(),
            b"contents".to_vec(),
            "u1".to_string(),
        );
        blob.checksum = "tampered".to_string();
        let err = store.put_blob(blob).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }
}
