//! Server side of an Inbetweenies v2 exchange. A peer posts its pending
//! changes and vector clock; we apply them against the local store and
//! index and hand back the resolved stats and any conflicts. Write-capable,
//! so gated behind a bearer token.

use axum::{extract::State, routing::post, Json, Router};
use chrono::{DateTime, Utc};

use crate::auth::Authenticated;
use crate::error::{CoreError, Result};
use crate::sync::{ChangeType, EntityChange, SyncChange, SyncRequest, SyncResponse, SyncType, PROTOCOL_VERSION};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(exchange))
}

/// POST /api/v1/sync/
async fn exchange(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>> {
    if request.protocol_version != PROTOCOL_VERSION {
        return Err(CoreError::InvalidInput(format!(
            "unsupported protocol version {}",
            request.protocol_version
        )));
    }

    // Snapshot what we have to offer *before* applying the peer's push, so a
    // round never echoes back the very changes the peer just sent.
    let changes = outbound_changes_since(&state, request.cursor.as_deref());
    let cursor = Some(Utc::now().to_rfc3339());

    let (stats, conflicts) = state.sync_receiver.apply_changes(&request.changes)?;

    Ok(Json(SyncResponse {
        protocol_version: PROTOCOL_VERSION.to_string(),
        sync_type: SyncType::Delta,
        changes,
        conflicts,
        vector_clock: request.vector_clock,
        cursor,
        sync_stats: stats,
    }))
}

/// Naive outbound scan: every entity updated after `cursor` (an RFC3339
/// timestamp from a prior round), or everything if there's no cursor yet.
/// No per-peer watermark is persisted server-side, so a peer that syncs from
/// scratch gets a full snapshot; a returning peer sends back the cursor this
/// handler just handed it and only sees what changed since.
fn outbound_changes_since(state: &AppState, cursor: Option<&str>) -> Vec<SyncChange> {
    let since: Option<DateTime<Utc>> = cursor
        .and_then(|c| DateTime::parse_from_rfc3339(c).ok())
        .map(|dt| dt.with_timezone(&Utc));

    state
        .index
        .read()
        .unwrap()
        .all_entities()
        .filter(|e| since.map(|s| e.updated_at > s).unwrap_or(true))
        .map(|e| SyncChange {
            change_type: if e.is_deleted() { ChangeType::Delete } else { ChangeType::Update },
            entity: Some(EntityChange {
                id: e.entity_id.clone(),
                version: e.version.clone(),
                entity_type: e.entity_type,
                name: e.name.clone(),
                content: e.content.clone(),
                source_type: e.source_type,
                user_id: e.user_id.clone(),
                parent_versions: e.parent_versions.clone(),
                created_at: e.created_at,
                updated_at: e.updated_at,
            }),
            relationships: vec![],
        })
        .collect()
}
