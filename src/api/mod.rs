pub mod graph;
pub mod health;
pub mod sync;
pub mod tools;

use crate::AppState;
use axum::Router;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/graph", graph::router())
        .nest("/api/v1/sync", sync::router())
        .nest("/api/v1/mcp/tools", tools::router())
}
