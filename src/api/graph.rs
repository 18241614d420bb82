//! REST surface over the graph store and index: entity/relationship reads
//! and writes, search, path finding, connected-entity traversal, and
//! statistics. Mutating routes require a bearer token; reads are open.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Authenticated;
use crate::error::{CoreError, Result};
use crate::graph::entity::{Entity, EntityType};
use crate::graph::index::{Direction, GraphStatistics};
use crate::graph::relationship::{Relationship, RelationshipType};
use crate::search;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/entities", get(list_entities).post(create_entity))
        .route("/entities/:id", get(get_entity).put(update_entity))
        .route("/entities/:id/versions", get(get_entity_versions))
        .route("/entities/:id/connected", get(get_connected))
        .route("/entities/:id/similar", get(find_similar))
        .route("/relationships", get(list_relationships).post(create_relationship))
        .route("/search", post(search_entities))
        .route("/path", post(find_path))
        .route("/statistics", get(statistics))
}

#[derive(Debug, Deserialize)]
pub struct ListEntitiesQuery {
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// GET /entities?type=&limit=&offset=
async fn list_entities(State(state): State<AppState>, Query(q): Query<ListEntitiesQuery>) -> Result<Json<Value>> {
    let index = state.index.read().unwrap();
    let mut entities: Vec<&Entity> = match q.entity_type.as_deref() {
        Some(t) => {
            let entity_type = EntityType::from_str(t)
                .ok_or_else(|| CoreError::InvalidInput(format!("unknown entity_type {t}")))?;
            index.all_entities().filter(|e| e.entity_type == entity_type).collect()
        }
        None => index.all_entities().collect(),
    };
    entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

    let offset = q.offset.unwrap_or(0);
    let limit = q.limit.unwrap_or(state.config.default_limit).min(state.config.max_limit);
    let page: Vec<&Entity> = entities.into_iter().skip(offset).take(limit).collect();
    Ok(Json(json!(page)))
}

#[derive(Debug, Deserialize)]
pub struct CreateEntityBody {
    pub entity_type: String,
    pub name: String,
    pub user_id: String,
    #[serde(default)]
    pub content: Value,
}

/// POST /entities
async fn create_entity(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(body): Json<CreateEntityBody>,
) -> Result<Json<Value>> {
    let result = state.dispatcher.dispatch(
        "create_entity",
        json!({
            "entity_type": body.entity_type,
            "name": body.name,
            "user_id": body.user_id,
            "content": body.content,
        }),
    );
    envelope_to_result(result)
}

#[derive(Debug, Deserialize)]
pub struct GetEntityQuery {
    pub version: Option<String>,
    pub include_relationships: Option<bool>,
}

/// GET /entities/{id}?version=&include_relationships=
async fn get_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<GetEntityQuery>,
) -> Result<Json<Value>> {
    let entity = match q.version {
        Some(version) => state
            .store
            .get_entity(&id, Some(&version))?
            .ok_or_else(|| CoreError::NotFound(format!("entity {id}@{version}")))?,
        None => {
            let index = state.index.read().unwrap();
            index.get_entity(&id).cloned().ok_or_else(|| CoreError::NotFound(format!("entity {id}")))?
        }
    };

    let mut body = json!({ "entity": entity });
    if q.include_relationships.unwrap_or(false) {
        let index = state.index.read().unwrap();
        let outgoing = index.get_connected_entities(&id, None, Direction::Outgoing, 1);
        let incoming = index.get_connected_entities(&id, None, Direction::Incoming, 1);
        body["relationships"] = json!({ "outgoing": outgoing, "incoming": incoming });
    }
    Ok(Json(body))
}

/// GET /entities/{id}/versions
async fn get_entity_versions(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<Entity>>> {
    Ok(Json(state.store.get_entity_versions(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntityBody {
    pub user_id: String,
    pub changes: Value,
}

/// PUT /entities/{id} — creates a new version, never mutates in place.
async fn update_entity(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(id): Path<String>,
    Json(body): Json<UpdateEntityBody>,
) -> Result<Json<Value>> {
    let result = state.dispatcher.dispatch(
        "update_entity",
        json!({ "entity_id": id, "user_id": body.user_id, "changes": body.changes }),
    );
    envelope_to_result(result)
}

#[derive(Debug, Deserialize)]
pub struct ConnectedQuery {
    #[serde(rename = "type")]
    pub relationship_type: Option<String>,
    pub direction: Option<String>,
    pub max_depth: Option<u32>,
}

/// GET /entities/{id}/connected?type=&direction=&max_depth=
async fn get_connected(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<ConnectedQuery>,
) -> Result<Json<Value>> {
    let index = state.index.read().unwrap();
    index.get_entity(&id).ok_or_else(|| CoreError::NotFound(format!("entity {id}")))?;

    let rel_type = q
        .relationship_type
        .as_deref()
        .map(|t| {
            RelationshipType::from_str(t)
                .ok_or_else(|| CoreError::InvalidInput(format!("unknown relationship_type {t}")))
        })
        .transpose()?;
    let direction = match q.direction.as_deref() {
        Some("incoming") => Direction::Incoming,
        Some("outgoing") => Direction::Outgoing,
        Some("both") | None => Direction::Both,
        Some(other) => return Err(CoreError::InvalidInput(format!("unknown direction {other}"))),
    };
    let max_depth = q.max_depth.unwrap_or(state.config.default_max_depth).min(20);

    let connections = index.get_connected_entities(&id, rel_type, direction, max_depth);
    Ok(Json(json!(connections)))
}

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    pub threshold: Option<f64>,
    pub limit: Option<usize>,
}

/// GET /entities/{id}/similar?threshold=&limit=
async fn find_similar(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<SimilarQuery>,
) -> Result<Json<Value>> {
    let result = state.dispatcher.dispatch(
        "find_similar_entities",
        json!({ "entity_id": id, "threshold": q.threshold, "limit": q.limit }),
    );
    envelope_to_result(result)
}

#[derive(Debug, Deserialize)]
pub struct ListRelationshipsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "type")]
    pub relationship_type: Option<String>,
}

/// GET /relationships?from=&to=&type=
async fn list_relationships(
    State(state): State<AppState>,
    Query(q): Query<ListRelationshipsQuery>,
) -> Result<Json<Vec<Relationship>>> {
    let rel_type = q
        .relationship_type
        .as_deref()
        .map(|t| {
            RelationshipType::from_str(t)
                .ok_or_else(|| CoreError::InvalidInput(format!("unknown relationship_type {t}")))
        })
        .transpose()?;
    Ok(Json(state.store.get_relationships(q.from.as_deref(), q.to.as_deref(), rel_type, false)?))
}

#[derive(Debug, Deserialize)]
pub struct CreateRelationshipBody {
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub relationship_type: String,
    pub user_id: String,
    #[serde(default)]
    pub properties: Value,
}

/// POST /relationships
async fn create_relationship(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(body): Json<CreateRelationshipBody>,
) -> Result<Json<Value>> {
    let result = state.dispatcher.dispatch(
        "create_relationship",
        json!({
            "from_entity_id": body.from_entity_id,
            "to_entity_id": body.to_entity_id,
            "relationship_type": body.relationship_type,
            "user_id": body.user_id,
            "properties": body.properties,
        }),
    );
    envelope_to_result(result)
}

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query: String,
    pub entity_types: Option<Vec<String>>,
    pub limit: Option<usize>,
}

/// POST /search — body `{query, entity_types?, limit?}`.
async fn search_entities(State(state): State<AppState>, Json(body): Json<SearchBody>) -> Result<Json<Value>> {
    let result = state.dispatcher.dispatch(
        "search_entities",
        json!({ "query": body.query, "entity_types": body.entity_types, "limit": body.limit }),
    );
    envelope_to_result(result)
}

#[derive(Debug, Deserialize)]
pub struct FindPathBody {
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub max_depth: Option<u32>,
}

/// POST /path — body `{from_entity_id, to_entity_id, max_depth}`.
async fn find_path(State(state): State<AppState>, Json(body): Json<FindPathBody>) -> Result<Json<Value>> {
    let result = state.dispatcher.dispatch(
        "find_path",
        json!({ "from_entity_id": body.from_entity_id, "to_entity_id": body.to_entity_id, "max_depth": body.max_depth }),
    );
    envelope_to_result(result)
}

/// GET /statistics
async fn statistics(State(state): State<AppState>) -> Json<GraphStatistics> {
    Json(state.index.read().unwrap().get_statistics())
}

/// The tool dispatcher always returns `{"success": ..}` envelopes and never
/// raises. REST handlers that delegate to it unwrap that envelope back into
/// a proper `CoreError` so the usual status-code mapping still applies.
fn envelope_to_result(envelope: Value) -> Result<Json<Value>> {
    if envelope.get("success").and_then(Value::as_bool) == Some(true) {
        Ok(Json(envelope["result"].clone()))
    } else {
        let message = envelope.get("error").and_then(Value::as_str).unwrap_or("tool call failed").to_string();
        Err(CoreError::InvalidInput(message))
    }
}
