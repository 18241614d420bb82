use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The closed set of binary blob content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobType {
    Pdf,
    Jpeg,
    Png,
    Binary,
}

/// Transfer state of a blob relative to the authoritative server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobSyncStatus {
    PendingUpload,
    Uploaded,
    Downloaded,
    Failed,
}

/// Binary content (PDFs, photos) stored outside the entity content stream
/// and linked to entities by `HAS_BLOB` edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blob {
    pub id: String,
    pub name: String,
    pub blob_type: BlobType,
    pub mime_type: String,
    pub size: u64,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    #[serde(default = "default_metadata")]
    pub blob_metadata: serde_json::Value,
    pub checksum: String,
    pub sync_status: BlobSyncStatus,
    pub server_url: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub user_id: String,
}

fn default_metadata() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Blob {
    /// Construct a blob from raw bytes, computing `checksum` and `size` and
    /// marking it `pending_upload` as a freshly authored blob must be.
    pub fn new(
        id: String,
        name: String,
        blob_type: BlobType,
        mime_type: String,
        data: Vec<u8>,
        user_id: String,
    ) -> Self {
        let checksum = Self::checksum_of(&data);
        let size = data.len() as u64;
        Self {
            id,
            name,
            blob_type,
            mime_type,
            size,
            data,
            blob_metadata: default_metadata(),
            checksum,
            sync_status: BlobSyncStatus::PendingUpload,
            server_url: None,
            last_sync_at: None,
            user_id,
        }
    }

    pub fn checksum_of(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Checksum integrity property: `checksum == SHA256(data)` and
    /// `size == len(data)`.
    pub fn is_consistent(&self) -> bool {
        self.checksum == Self::checksum_of(&self.data) && self.size as usize == self.data.len()
    }

    /// Replace the blob's bytes, recomputing checksum/size and resetting
    /// `sync_status` to `pending_upload` as the invariant requires.
    pub fn replace_data(&mut self, data: Vec<u8>) {
        self.checksum = Self::checksum_of(&data);
        self.size = data.len() as u64;
        self.data = data;
        self.sync_status = BlobSyncStatus::PendingUpload;
    }
}

/// Blob bytes are hex-encoded on the wire so they survive JSON round-trips.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_blob_is_consistent_and_pending() {
        let blob = Blob::new(
            "b1".to_string(),
            "manual.pdf".to_string(),
            BlobType::Pdf,
            "application/pdf".to_string(),
            b"hello world".to_vec(),
            "u1".to_string(),
        );
        assert!(blob.is_consistent());
        assert_eq!(blob.sync_status, BlobSyncStatus::PendingUpload);
        assert_eq!(blob.size, 11);
    }

    #[test]
    fn replace_data_resets_sync_status_and_checksum() {
        let mut blob = Blob::new(
            "b1".to_string(),
            "photo.png".to_string(),
            BlobType::Png,
            "image/png".to_string(),
            b"first".to_vec(),
            "u1".to_string(),
        );
        blob.sync_status = BlobSyncStatus::Uploaded;
        blob.replace_data(b"second version".to_vec());
        assert_eq!(blob.sync_status, BlobSyncStatus::PendingUpload);
        assert!(blob.is_consistent());
        assert_eq!(blob.checksum, Blob::checksum_of(b"second version"));
    }

    #[test]
    fn tampered_checksum_is_detected() {
        let mut blob = Blob::new(
            "b1".to_string(),
            "photo.png".to_string(),
            BlobType::Png,
            "image/png".to_string(),
            b"data".to_vec(),
            "u1".to_string(),
        );
        blob.checksum = "deadbeef".to_string();
        assert!(!blob.is_consistent());
    }
}
