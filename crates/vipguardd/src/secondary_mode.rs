//! Secondary mode: primary health probing and VIP takeover.
//!
//! The pull side of config sync is request-driven and lives in the HTTP
//! surface; this module only owns the probe loop.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use vipguard_arp::RawSocketAnnouncer;
use vipguard_core::HaConfig;
use vipguard_health::{FailoverCoordinator, HttpHealthProbe};

/// Start the failover loop. Fails if `[vip]` or `[primary]` is missing.
pub fn spawn(config: &HaConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<JoinHandle<()>> {
    let claim = config.vip_claim()?;
    let primary = config.primary_endpoint()?;
    let (interval, timeout) = config
        .primary
        .as_ref()
        .map(|p| (p.probe_interval, p.probe_timeout))
        .ok_or_else(|| anyhow::anyhow!("primary is not configured"))?;

    info!(
        %primary,
        vip = %claim.address,
        mac = %claim.mac,
        interface = %claim.interface,
        "failover coordinator initialized"
    );

    let coordinator = FailoverCoordinator::new(
        config.role,
        Arc::new(HttpHealthProbe::new(primary, timeout)),
        Arc::new(RawSocketAnnouncer),
        claim,
        interval,
    );

    Ok(tokio::spawn(async move {
        coordinator.run(shutdown).await;
    }))
}
