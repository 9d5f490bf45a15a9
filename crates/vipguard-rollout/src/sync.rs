//! Secondary sync: pull config from the primary and apply it locally.
//!
//! Triggered by `POST /update-config`. The caller gets an answer only after
//! the local proxy has been restarted and reported healthy, so a success
//! response means this secondary has converged.
//!
//! Both artifacts are fetched before anything is written; a fetch failure
//! leaves the local files untouched. The writes themselves are not
//! transactional: if writing the static file fails after the dynamic file
//! was replaced, the dynamic file stays updated.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, warn};

use vipguard_core::Role;
use vipguard_core::http::{self, Endpoint};
use vipguard_docker::ProcessMonitor;
use vipguard_health::http_probe;

use crate::error::SyncError;

/// What a successful sync did.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub container_id: String,
    pub dynamic_bytes: usize,
    pub static_bytes: usize,
    pub elapsed_ms: u64,
}

pub struct SecondarySync {
    role: Role,
    primary: Option<Endpoint>,
    monitor: ProcessMonitor,
    dynamic_path: PathBuf,
    static_path: PathBuf,
    request_timeout: Duration,
    health_timeout: Duration,
    /// Serialises concurrent triggers so the config files have one writer.
    in_flight: Mutex<()>,
}

impl SecondarySync {
    pub fn new(
        role: Role,
        primary: Option<Endpoint>,
        monitor: ProcessMonitor,
        dynamic_path: PathBuf,
        static_path: PathBuf,
    ) -> Self {
        Self {
            role,
            primary,
            monitor,
            dynamic_path,
            static_path,
            request_timeout: Duration::from_secs(10),
            health_timeout: Duration::from_secs(60),
            in_flight: Mutex::new(()),
        }
    }

    /// Timeout for each request to the primary (probe and both fetches).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// How long the local proxy gets to become healthy after restart.
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Pull, write, restart, verify.
    pub async fn update_config(&self) -> Result<SyncReport, SyncError> {
        if self.role.is_primary() {
            warn!("update-config requested on a primary instance");
            return Err(SyncError::NotSecondary);
        }
        let primary = self.primary.as_ref().ok_or(SyncError::NoPrimary)?;

        let _guard = self.in_flight.lock().await;
        let started = Instant::now();
        info!(%primary, "updating configuration from primary");

        if !http_probe(primary, "/health", self.request_timeout).await.is_healthy() {
            error!(%primary, "primary instance is not healthy, not updating configuration");
            return Err(SyncError::PrimaryUnhealthy);
        }

        let dynamic = self.fetch(primary, "/config/dynamic", "dynamic").await?;
        let static_ = self.fetch(primary, "/config/static", "static").await?;

        write(&self.dynamic_path, &dynamic).await?;
        write(&self.static_path, &static_).await?;

        let container_id = self.monitor.resolve_container_id().await.map_err(|e| {
            error!(error = %e, "proxy container not found");
            SyncError::from(e)
        })?;

        info!(%container_id, "restarting proxy container to apply new configuration");
        let healthy = self
            .monitor
            .restart_container_and_await(&container_id, self.health_timeout)
            .await?;
        if !healthy {
            error!(%container_id, "proxy container did not become healthy after configuration update");
            return Err(SyncError::HealthTimeout {
                container_id,
                timeout: self.health_timeout,
            });
        }

        let report = SyncReport {
            container_id,
            dynamic_bytes: dynamic.len(),
            static_bytes: static_.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            container_id = %report.container_id,
            elapsed_ms = report.elapsed_ms,
            "configuration updated, proxy healthy"
        );
        Ok(report)
    }

    async fn fetch(
        &self,
        primary: &Endpoint,
        path: &str,
        artifact: &'static str,
    ) -> Result<Bytes, SyncError> {
        let resp = http::get(primary, path, self.request_timeout)
            .await
            .map_err(|e| SyncError::Fetch {
                artifact,
                reason: e.to_string(),
            })?;
        if !resp.is_success() {
            error!(%primary, %path, status = %resp.status, "failed to retrieve configuration");
            return Err(SyncError::Fetch {
                artifact,
                reason: format!("primary answered {}", resp.status),
            });
        }
        Ok(resp.body)
    }
}

async fn write(path: &Path, content: &[u8]) -> Result<(), SyncError> {
    tokio::fs::write(path, content)
        .await
        .map_err(|source| SyncError::Write {
            path: path.to_path_buf(),
            source,
        })
}
