//! Availability probing for the auxiliary read-only service.
//!
//! One minimal GraphQL query, no retries. Every failure (timeout, refused
//! connection, HTTP error status, malformed body, GraphQL errors) is
//! reported as `false`.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use zg_ws::BoxFuture;

use crate::error::{RegistryError, RegistryResult};

/// Probe query; valid against any GraphQL schema.
const PROBE_QUERY: &str = "{ __typename }";

/// Best-effort reachability check.
pub trait Probe: Send + Sync {
    fn probe<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, bool>;
}

/// HTTP GraphQL prober.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new() -> RegistryResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| RegistryError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn query(&self, url: &str) -> Result<(), String> {
        let response = self
            .client
            .post(url)
            .json(&json!({ "query": PROBE_QUERY }))
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| format!("malformed body: {e}"))?;

        if body.get("errors").is_some_and(|errors| !errors.is_null()) {
            return Err("GraphQL errors in response".to_string());
        }
        if body.get("data").is_none() {
            return Err("response has no data".to_string());
        }
        Ok(())
    }
}

impl Probe for HttpProber {
    fn probe<'a>(&'a self, url: &'a str, timeout: Duration) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            debug!(%url, timeout_ms = timeout.as_millis() as u64, "Probing auxiliary service");
            match tokio::time::timeout(timeout, self.query(url)).await {
                Ok(Ok(())) => {
                    info!(%url, "Auxiliary service available");
                    true
                }
                Ok(Err(reason)) => {
                    warn!(%url, %reason, "Auxiliary service unavailable");
                    false
                }
                Err(_) => {
                    warn!(%url, "Auxiliary service probe timed out");
                    false
                }
            }
        })
    }
}

/// Client for the auxiliary read-only service, present only after a
/// successful probe.
#[derive(Debug, Clone)]
pub struct AuxServiceClient {
    url: String,
    client: Client,
}

impl AuxServiceClient {
    pub fn new(url: impl Into<String>, client: Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP client for issuing queries against the service.
    pub fn http(&self) -> &Client {
        &self.client
    }
}
