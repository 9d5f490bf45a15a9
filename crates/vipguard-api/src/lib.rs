//! vipguard-api: HTTP surface shared by primary and secondary.
//!
//! # API Routes
//!
//! | Method | Path | Role | Description |
//! |---|---|---|---|
//! | GET | `/health` | both | 200 if the local proxy container is healthy, 503 otherwise |
//! | GET | `/config/dynamic` | primary | Raw dynamic config file, 404 if absent |
//! | GET | `/config/static` | primary | Raw static config file, 404 if absent |
//! | POST | `/update-config` | secondary | Pull config from the primary, restart, verify |

pub mod handlers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};

use vipguard_core::{ConfigResult, HaConfig, Role};
use vipguard_docker::ProcessMonitor;
use vipguard_rollout::SecondarySync;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub role: Role,
    pub monitor: ProcessMonitor,
    pub dynamic_path: PathBuf,
    pub static_path: PathBuf,
    pub sync: Arc<SecondarySync>,
}

impl ApiState {
    /// State for a validated config: file paths from `[proxy]`, and a
    /// `SecondarySync` wired to the configured primary.
    pub fn from_config(config: &HaConfig, monitor: ProcessMonitor) -> ConfigResult<Self> {
        let primary = match config.role {
            Role::Secondary => Some(config.primary_endpoint()?),
            Role::Primary => None,
        };
        let probe_timeout = config
            .primary
            .as_ref()
            .map(|p| p.probe_timeout)
            .unwrap_or(Duration::from_secs(5));

        let sync = SecondarySync::new(
            config.role,
            primary,
            monitor.clone(),
            config.proxy.dynamic_path(),
            config.proxy.static_path(),
        )
        .with_request_timeout(probe_timeout)
        .with_health_timeout(config.proxy.health_timeout);

        Ok(Self {
            role: config.role,
            monitor,
            dynamic_path: config.proxy.dynamic_path(),
            static_path: config.proxy.static_path(),
            sync: Arc::new(sync),
        })
    }
}

/// Build the complete router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/config/dynamic", get(handlers::dynamic_config))
        .route("/config/static", get(handlers::static_config))
        .route("/update-config", post(handlers::update_config))
        .with_state(state)
}
