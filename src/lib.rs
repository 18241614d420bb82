//! Inbetweenies: a bidirectional sync core for a smart-home knowledge graph.
//!
//! Four layers, lower ones with no knowledge of higher ones: the graph
//! store (`graph::store`), the in-memory graph index (`graph::index`), the
//! sync engine (`sync`), and the tool dispatcher (`tools`) that exposes a
//! fixed, validated catalog over the first three.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod graph;
pub mod search;
pub mod sync;
pub mod tools;

use std::sync::{Arc, RwLock};

use config::Config;
use graph::{GraphIndex, GraphStore};
use sync::SyncReceiver;
use tools::ToolDispatcher;

/// Shared application state, threaded through every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<GraphStore>,
    pub index: Arc<RwLock<GraphIndex>>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub sync_receiver: Arc<SyncReceiver>,
}

impl AppState {
    pub fn new(config: Config) -> error::Result<Self> {
        let store = Arc::new(GraphStore::open(&config.db_path)?);
        let mut index = GraphIndex::new();
        index.load_from_storage(&store)?;
        let index = Arc::new(RwLock::new(index));

        let dispatcher = Arc::new(ToolDispatcher::new(
            store.clone(),
            index.clone(),
            config.default_limit,
            config.max_limit,
            config.default_max_depth,
        ));
        let sync_receiver = Arc::new(SyncReceiver::new(store.clone(), index.clone()));

        Ok(Self { config: Arc::new(config), store, index, dispatcher, sync_receiver })
    }
}

impl axum::extract::FromRef<AppState> for auth::AuthTokens {
    fn from_ref(state: &AppState) -> Self {
        auth::AuthTokens(Arc::new(state.config.auth_tokens.clone()))
    }
}
