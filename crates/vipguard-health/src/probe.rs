//! One-shot HTTP health probe against a peer's `/health` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use vipguard_core::http::{self, Endpoint};

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The health endpoint returned 2xx.
    Healthy,
    /// The health endpoint returned non-2xx.
    Unhealthy,
    /// The probe could not be executed (connection error or timeout).
    Failed,
}

impl ProbeResult {
    pub fn is_healthy(self) -> bool {
        self == ProbeResult::Healthy
    }
}

/// Perform an HTTP health probe against `path` on an endpoint.
///
/// Returns `Healthy` if the response is 2xx, `Unhealthy` for non-2xx,
/// or `Failed` if the connection fails or times out.
pub async fn http_probe(endpoint: &Endpoint, path: &str, timeout: Duration) -> ProbeResult {
    match http::get(endpoint, path, timeout).await {
        Ok(resp) if resp.is_success() => ProbeResult::Healthy,
        Ok(resp) => {
            debug!(status = %resp.status, %endpoint, "health probe non-2xx");
            ProbeResult::Unhealthy
        }
        Err(e) => {
            debug!(error = %e, %endpoint, "health probe failed");
            ProbeResult::Failed
        }
    }
}

/// Health check of the primary as seen from a secondary.
#[async_trait]
pub trait PrimaryProbe: Send + Sync {
    async fn probe(&self) -> ProbeResult;
}

/// Probes `GET /health` on the primary with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    endpoint: Endpoint,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }
}

#[async_trait]
impl PrimaryProbe for HttpHealthProbe {
    async fn probe(&self) -> ProbeResult {
        http_probe(&self.endpoint, "/health", self.timeout).await
    }
}
