//! vipguard-health: failure detection and VIP takeover.
//!
//! # Architecture
//!
//! ```text
//! FailoverCoordinator (secondary only)
//!   ├── every probe_interval: PrimaryProbe::probe() → ProbeResult
//!   ├── Healthy            → stay passive
//!   └── Unhealthy | Failed → Announcer::announce(VIP)
//! ```
//!
//! There is no sticky "claimed" state. Every unhealthy tick announces
//! again, which repairs a lost broadcast on the next tick. A primary node
//! never runs the loop.

pub mod coordinator;
pub mod probe;

pub use coordinator::{FailoverCoordinator, TickOutcome};
pub use probe::{HttpHealthProbe, PrimaryProbe, ProbeResult, http_probe};
