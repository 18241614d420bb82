use std::time::Duration;

use crate::error::{CoreError, Result};

use super::protocol::{SyncRequest, SyncResponse};

/// Abstraction over "how a sync request reaches the other replica". The
/// server and client share the same `SyncEngine`; only the transport differs.
/// Plain `async fn` in the trait (no boxing) — `SyncEngine` is generic over
/// `T: SyncTransport` rather than holding a trait object, since nothing here
/// needs dynamic dispatch across transports at runtime.
pub trait SyncTransport: Send + Sync {
    fn exchange(
        &self,
        request: SyncRequest,
    ) -> impl std::future::Future<Output = Result<SyncResponse>> + Send;

    fn health(&self) -> impl std::future::Future<Output = bool> + Send;
}

/// HTTP transport to a peer's sync endpoint: a bearer token, a JSON body,
/// and a best-effort health probe that swallows transport errors into
/// `false`.
pub struct HttpSyncTransport {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpSyncTransport {
    pub fn new(base_url: String, auth_token: Option<String>, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(CoreError::from)?;
        Ok(Self { client, base_url, auth_token })
    }
}

impl SyncTransport for HttpSyncTransport {
    async fn exchange(&self, request: SyncRequest) -> Result<SyncResponse> {
        let url = format!("{}/api/v1/sync", self.base_url.trim_end_matches('/'));
        let mut builder = self.client.post(&url).json(&request);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(CoreError::NetworkUnavailable(format!(
                "sync peer returned status {}",
                response.status()
            )));
        }
        let body: SyncResponse = response.json().await?;
        Ok(body)
    }

    async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_trailing_slash_base_url() {
        let transport = HttpSyncTransport::new("http://localhost:9000/".to_string(), None, 1000);
        assert!(transport.is_ok());
    }
}
