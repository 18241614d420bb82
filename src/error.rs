use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Core error taxonomy shared by the graph store, sync engine, and tool
/// dispatcher. Every failure path in the core resolves to one of these
/// variants; the HTTP edge maps them to status codes, the tool dispatcher
/// maps them into envelope `error` strings.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid relationship: {0}")]
    InvalidRelationship(String),

    #[error("duplicate version: {0}")]
    DuplicateVersion(String),

    #[error("conflict unresolved: {0}")]
    #[allow(dead_code)]
    ConflictUnresolved(String),

    #[error("sync in progress for replica {0}")]
    SyncInProgress(String),

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl CoreError {
    /// Machine-readable error code, per the taxonomy of the error-handling
    /// design: the same string surfaces in HTTP bodies and tool envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::InvalidInput(_) => "INVALID_INPUT",
            CoreError::InvalidRelationship(_) => "INVALID_RELATIONSHIP",
            CoreError::DuplicateVersion(_) => "DUPLICATE_VERSION",
            CoreError::ConflictUnresolved(_) => "CONFLICT_UNRESOLVED",
            CoreError::SyncInProgress(_) => "SYNC_IN_PROGRESS",
            CoreError::NetworkUnavailable(_) => "NETWORK_UNAVAILABLE",
            CoreError::StorageError(_) => "STORAGE_ERROR",
            CoreError::UnknownTool(_) => "UNKNOWN_TOOL",
            CoreError::Sqlite(_) => "STORAGE_ERROR",
            CoreError::Reqwest(_) => "NETWORK_UNAVAILABLE",
            CoreError::SerdeJson(_) => "INVALID_INPUT",
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::InvalidRelationship(_) => StatusCode::BAD_REQUEST,
            CoreError::DuplicateVersion(_) => StatusCode::CONFLICT,
            CoreError::ConflictUnresolved(_) => StatusCode::CONFLICT,
            CoreError::SyncInProgress(_) => StatusCode::CONFLICT,
            CoreError::NetworkUnavailable(_) => StatusCode::BAD_GATEWAY,
            CoreError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::UnknownTool(_) => StatusCode::BAD_REQUEST,
            CoreError::Sqlite(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Reqwest(_) => StatusCode::BAD_GATEWAY,
            CoreError::SerdeJson(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = CoreError::NotFound("entity x".to_string());
        assert_eq!(err.code(), "NOT_FOUND");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn duplicate_version_maps_to_409() {
        let err = CoreError::DuplicateVersion("e1/v1".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn sync_in_progress_maps_to_409() {
        let err = CoreError::SyncInProgress("replica-a".to_string());
        assert_eq!(err.code(), "SYNC_IN_PROGRESS");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn invalid_relationship_maps_to_400() {
        let err = CoreError::InvalidRelationship("CONTROLS: ROOM->ROOM".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn storage_error_maps_to_500() {
        let err = CoreError::StorageError("disk full".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unknown_tool_code() {
        let err = CoreError::UnknownTool("frobnicate".to_string());
        assert_eq!(err.code(), "UNKNOWN_TOOL");
    }
}
