//! Failover coordinator: the secondary's probe-and-claim loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use vipguard_arp::{Announcer, announce_logged};
use vipguard_core::{Role, VipClaim};

use crate::probe::{PrimaryProbe, ProbeResult};

/// What a single tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Primary healthy, nothing sent.
    Standby,
    /// Primary unhealthy, an announcement was attempted.
    Claiming { announced: bool },
}

pub struct FailoverCoordinator {
    role: Role,
    probe: Arc<dyn PrimaryProbe>,
    announcer: Arc<dyn Announcer>,
    claim: VipClaim,
    interval: Duration,
}

impl FailoverCoordinator {
    pub fn new(
        role: Role,
        probe: Arc<dyn PrimaryProbe>,
        announcer: Arc<dyn Announcer>,
        claim: VipClaim,
        interval: Duration,
    ) -> Self {
        Self {
            role,
            probe,
            announcer,
            claim,
            interval,
        }
    }

    /// Probe the primary once and announce the VIP if it is not healthy.
    pub async fn tick(&self) -> TickOutcome {
        match self.probe.probe().await {
            ProbeResult::Healthy => {
                debug!("primary healthy, staying passive");
                TickOutcome::Standby
            }
            result @ (ProbeResult::Unhealthy | ProbeResult::Failed) => {
                warn!(?result, vip = %self.claim.address, "primary not healthy, announcing VIP");
                let announced = announce_logged(self.announcer.as_ref(), &self.claim);
                TickOutcome::Claiming { announced }
            }
        }
    }

    /// Run until shutdown. Returns immediately on a primary.
    ///
    /// The first tick fires at once, then every `interval`. Ticks never
    /// overlap: a slow probe delays the next tick instead of stacking.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if self.role.is_primary() {
            info!("primary role, failover coordinator not started");
            return;
        }

        info!(
            interval_secs = self.interval.as_secs(),
            vip = %self.claim.address,
            "failover coordinator started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("failover coordinator shutting down");
                    break;
                }
            }
        }
    }
}
