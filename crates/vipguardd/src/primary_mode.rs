//! Primary mode: config change detection and rollout.
//!
//! In this mode, the daemon:
//! 1. Resolves the secondary list (required, may be empty)
//! 2. Records a baseline of the config directory
//! 3. On every change batch, restarts the proxy and waits for it to be healthy
//! 4. Only then tells each secondary to pull the new config

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use vipguard_core::HaConfig;
use vipguard_docker::ProcessMonitor;
use vipguard_rollout::{ConfigChangeDetector, ConfigWatcher, HttpNotifier, RolloutSequencer};

/// Start the detector loop. Fails if the secondary list is not configured.
pub fn spawn(
    config: &HaConfig,
    monitor: ProcessMonitor,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<JoinHandle<()>> {
    let secondaries = config.secondary_endpoints()?;
    info!(
        secondaries = secondaries.len(),
        push_timeout_secs = config.push_timeout().as_secs(),
        "rollout sequencer initialized"
    );

    let sequencer = Arc::new(RolloutSequencer::new(
        monitor,
        Arc::new(HttpNotifier::new(config.push_timeout())),
        secondaries,
        config.proxy.health_timeout,
    ));
    let watcher = ConfigWatcher::new(&config.proxy.config_dir, &config.proxy.watch_extensions);
    let detector = ConfigChangeDetector::new(watcher, sequencer);

    let interval = config.proxy.watch_interval;
    Ok(tokio::spawn(async move {
        detector.run(interval, shutdown).await;
    }))
}
