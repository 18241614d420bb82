use std::env;

/// Application configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Path to the SQLite database file; ":memory:" for an ephemeral store.
    pub db_path: String,
    /// This replica's identifier, used as the `replica_id` in vector clocks
    /// and as the sync-lock key.
    pub replica_id: String,
    /// Bearer token required on write routes. Issuance is external; the
    /// server only validates tokens against this fixed set.
    pub auth_tokens: Vec<String>,
    /// Default max-depth for `find_path` / `get_connected_entities` when the
    /// caller omits one.
    pub default_max_depth: u32,
    /// Default result limit for search/list operations.
    pub default_limit: usize,
    /// Hard cap on `limit` for search/list operations.
    pub max_limit: usize,
    /// Reachability-probe timeout, in milliseconds.
    pub health_timeout_ms: u64,
    /// Sync-exchange timeout, in milliseconds (larger than the health probe).
    pub sync_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// development-friendly defaults.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            db_path: env::var("DB_PATH").unwrap_or_else(|_| "inbetweenies.db".to_string()),
            replica_id: env::var("REPLICA_ID").unwrap_or_else(|_| "server".to_string()),
            auth_tokens: env::var("AUTH_TOKENS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
            default_max_depth: env::var("DEFAULT_MAX_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            default_limit: env::var("DEFAULT_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            max_limit: env::var("MAX_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            health_timeout_ms: env::var("HEALTH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5_000),
            sync_timeout_ms: env::var("SYNC_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30_000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane_without_env() {
        // Avoid AUTH_TOKENS leaking in from a parallel test; construct directly.
        let config = Config {
            host: "0.0.0.0".to_string(),
            port: 8080,
            db_path: "inbetweenies.db".to_string(),
            replica_id: "server".to_string(),
            auth_tokens: vec![],
            default_max_depth: 10,
            default_limit: 10,
            max_limit: 100,
            health_timeout_ms: 5_000,
            sync_timeout_ms: 30_000,
        };
        assert_eq!(config.max_limit, 100);
        assert!(config.auth_tokens.is_empty());
    }
}
