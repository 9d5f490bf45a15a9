//! Process monitor: restart the proxy container and wait for it to
//! report healthy.
//!
//! Health transitions are asynchronous: after a restart the container
//! reports `starting` until its own health check passes. The monitor
//! polls the health field once per `poll_interval` until the container is
//! healthy or the deadline passes. A timed-out wait is an ordinary
//! `false`, not an error.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use vipguard_core::HealthStatus;

use crate::error::{ContainerError, ContainerResult};
use crate::runtime::ContainerRuntime;

/// One restart-and-verify cycle. Lives only as long as the wait.
#[derive(Debug, Clone)]
pub struct RolloutAttempt {
    pub container_id: String,
    pub started_at: Instant,
    pub deadline: Instant,
}

impl RolloutAttempt {
    pub fn begin(container_id: &str, timeout: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            container_id: container_id.to_string(),
            started_at,
            deadline: started_at + timeout,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Resolves and manages the proxy container through a `ContainerRuntime`.
#[derive(Clone)]
pub struct ProcessMonitor {
    runtime: Arc<dyn ContainerRuntime>,
    image_prefix: String,
    poll_interval: Duration,
}

impl ProcessMonitor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, image_prefix: &str) -> Self {
        Self {
            runtime,
            image_prefix: image_prefix.to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Override the health polling cadence (default 1s).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn image_prefix(&self) -> &str {
        &self.image_prefix
    }

    /// Id of the first container whose image starts with the prefix.
    pub async fn resolve_container_id(&self) -> ContainerResult<String> {
        let containers = self.runtime.list_containers().await?;
        containers
            .into_iter()
            .find(|c| c.image.starts_with(&self.image_prefix))
            .map(|c| c.id)
            .ok_or_else(|| ContainerError::NotFound(format!("image prefix {:?}", self.image_prefix)))
    }

    /// Single-shot health check. Missing health field or any runtime
    /// error counts as not healthy.
    pub async fn is_healthy(&self, container_id: &str) -> bool {
        match self.runtime.inspect(container_id).await {
            Ok(details) => details.health.as_deref() == Some("healthy"),
            Err(e) => {
                warn!(%container_id, error = %e, "health inspection failed");
                false
            }
        }
    }

    /// Health of the proxy as seen right now. `Unknown` when the
    /// container cannot be resolved.
    pub async fn health(&self) -> HealthStatus {
        match self.resolve_container_id().await {
            Ok(id) if self.is_healthy(&id).await => HealthStatus::Healthy,
            Ok(_) => HealthStatus::Unhealthy,
            Err(e) => {
                debug!(error = %e, "proxy container not resolved");
                HealthStatus::Unknown
            }
        }
    }

    /// Resolve the proxy, restart it, and wait up to `timeout` for it to
    /// become healthy.
    ///
    /// Errors only when the container cannot be found or the restart is
    /// rejected; a slow container yields `Ok(false)`.
    pub async fn restart_and_await_healthy(&self, timeout: Duration) -> ContainerResult<bool> {
        let container_id = self.resolve_container_id().await?;
        self.restart_container_and_await(&container_id, timeout).await
    }

    /// Restart a known container and wait for it to become healthy.
    pub async fn restart_container_and_await(
        &self,
        container_id: &str,
        timeout: Duration,
    ) -> ContainerResult<bool> {
        info!(%container_id, "restarting proxy container");
        self.runtime.restart(container_id).await?;
        Ok(self.await_healthy(container_id, timeout).await)
    }

    /// Poll until healthy or `timeout` elapses.
    pub async fn await_healthy(&self, container_id: &str, timeout: Duration) -> bool {
        let attempt = RolloutAttempt::begin(container_id, timeout);

        loop {
            if self.is_healthy(container_id).await {
                info!(
                    %container_id,
                    elapsed_secs = attempt.elapsed().as_secs_f64(),
                    "proxy container healthy"
                );
                return true;
            }
            if attempt.expired() {
                warn!(
                    %container_id,
                    timeout_secs = timeout.as_secs(),
                    "proxy container did not become healthy in time"
                );
                return false;
            }
            debug!(%container_id, "waiting for proxy container to become healthy");
            tokio::time::sleep(self.poll_interval.min(attempt.remaining())).await;
        }
    }
}
