//! Rollout sequencer: restart the local proxy, gate on health, then tell
//! every secondary to pull.
//!
//! A rollout that does not come back healthy stops here: secondaries are
//! never notified about a config the primary could not run. Fan-out is
//! best-effort and concurrent, one task per secondary, each with its own
//! timeout and its own outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use vipguard_core::http::{self, Endpoint};
use vipguard_docker::ProcessMonitor;

use crate::error::NotifyError;

/// Sends the pull trigger to one secondary.
#[async_trait]
pub trait SecondaryNotifier: Send + Sync {
    async fn notify(&self, secondary: &Endpoint) -> Result<(), NotifyError>;
}

/// `POST /update-config` with an empty body.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    timeout: Duration,
}

impl HttpNotifier {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl SecondaryNotifier for HttpNotifier {
    async fn notify(&self, secondary: &Endpoint) -> Result<(), NotifyError> {
        let resp = http::post(secondary, "/update-config", self.timeout).await?;
        if resp.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                status: resp.status.as_u16(),
                message: resp.text(),
            })
        }
    }
}

/// Outcome of notifying one secondary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecondaryResult {
    pub secondary: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// How a rollout ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RolloutOutcome {
    /// Local proxy healthy; every configured secondary was contacted.
    Propagated { results: Vec<SecondaryResult> },
    /// Local proxy did not become healthy in time. Nothing propagated.
    Unhealthy,
    /// Restart could not be attempted. Nothing propagated.
    Aborted { reason: String },
}

impl RolloutOutcome {
    pub fn propagated(&self) -> bool {
        matches!(self, RolloutOutcome::Propagated { .. })
    }
}

pub struct RolloutSequencer {
    monitor: ProcessMonitor,
    notifier: Arc<dyn SecondaryNotifier>,
    secondaries: Vec<Endpoint>,
    health_timeout: Duration,
}

impl RolloutSequencer {
    /// `secondaries` is the start-up list; it never changes afterwards.
    pub fn new(
        monitor: ProcessMonitor,
        notifier: Arc<dyn SecondaryNotifier>,
        secondaries: Vec<Endpoint>,
        health_timeout: Duration,
    ) -> Self {
        Self {
            monitor,
            notifier,
            secondaries,
            health_timeout,
        }
    }

    pub fn secondaries(&self) -> &[Endpoint] {
        &self.secondaries
    }

    /// Run one rollout for a batch of changed files.
    pub async fn execute(&self, changed: &[PathBuf]) -> RolloutOutcome {
        info!(files = changed.len(), "rollout started");

        match self.monitor.restart_and_await_healthy(self.health_timeout).await {
            Ok(true) => {}
            Ok(false) => {
                error!(
                    critical = true,
                    timeout_secs = self.health_timeout.as_secs(),
                    "proxy did not become healthy after configuration change, not updating secondaries"
                );
                return RolloutOutcome::Unhealthy;
            }
            Err(e) => {
                error!(critical = true, error = %e, "rollout aborted, not updating secondaries");
                return RolloutOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
        }

        if self.secondaries.is_empty() {
            info!("no secondaries configured, skipping fan-out");
            return RolloutOutcome::Propagated {
                results: Vec::new(),
            };
        }

        let results = self.fan_out().await;
        let failed = results.iter().filter(|r| !r.ok).count();
        info!(
            notified = results.len() - failed,
            failed,
            "rollout complete"
        );
        RolloutOutcome::Propagated { results }
    }

    /// Notify every secondary concurrently. Results keep configuration order.
    async fn fan_out(&self) -> Vec<SecondaryResult> {
        let mut tasks = JoinSet::new();
        for (index, secondary) in self.secondaries.iter().cloned().enumerate() {
            let notifier = Arc::clone(&self.notifier);
            tasks.spawn(async move {
                info!(%secondary, "sending configuration update request");
                let result = match notifier.notify(&secondary).await {
                    Ok(()) => {
                        info!(%secondary, "secondary updated");
                        SecondaryResult {
                            secondary: secondary.to_string(),
                            ok: true,
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!(%secondary, error = %e, "failed to update secondary");
                        SecondaryResult {
                            secondary: secondary.to_string(),
                            ok: false,
                            error: Some(e.to_string()),
                        }
                    }
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<SecondaryResult>> = vec![None; self.secondaries.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!(error = %e, "fan-out task failed"),
            }
        }

        slots
            .into_iter()
            .zip(&self.secondaries)
            .map(|(slot, secondary)| {
                slot.unwrap_or_else(|| SecondaryResult {
                    secondary: secondary.to_string(),
                    ok: false,
                    error: Some("notification task did not complete".to_string()),
                })
            })
            .collect()
    }
}
