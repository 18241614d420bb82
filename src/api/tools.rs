//! MCP-style tool surface: a fixed catalog and a single dispatch endpoint.
//! Every dispatch call returns HTTP 200 with a `{"success": ...}` envelope —
//! the dispatcher never raises, so there's no status-code mapping here.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use crate::tools::tool_catalog;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tools))
        .route("/:name", post(dispatch))
}

/// GET /tools
async fn list_tools() -> Json<Value> {
    Json(tool_catalog())
}

/// POST /tools/:name
async fn dispatch(State(state): State<AppState>, Path(name): Path<String>, Json(params): Json<Value>) -> Json<Value> {
    Json(state.dispatcher.dispatch(&name, params))
}
