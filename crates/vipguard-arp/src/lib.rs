//! vipguard-arp: VIP ownership announcements.
//!
//! A secondary that decides to take over the virtual IP broadcasts a
//! gratuitous ARP request (sender = target = VIP) from the configured MAC.
//! Switches and neighbours update their caches and traffic for the VIP
//! follows the announcing host.
//!
//! Announcements are fire-and-forget. Callers repeat them on every
//! unhealthy tick; nothing here remembers whether the VIP was claimed.

pub mod frame;
pub mod socket;

use thiserror::Error;
use tracing::{info, warn};

use vipguard_core::VipClaim;

pub use frame::{ARP_FRAME_LEN, build_gratuitous_arp};
pub use socket::RawSocketAnnouncer;

/// Errors from a single announcement attempt. Never fatal.
#[derive(Debug, Error)]
pub enum ArpError {
    #[error("no network interface matches {0:?}")]
    InterfaceNotFound(String),

    #[error("raw socket error: {0}")]
    Socket(#[source] std::io::Error),

    #[error("short send: {sent} of {expected} bytes")]
    ShortSend { sent: usize, expected: usize },

    #[error("raw packet sockets are not supported on this platform")]
    Unsupported,
}

/// Something that can broadcast VIP ownership.
pub trait Announcer: Send + Sync {
    fn announce(&self, claim: &VipClaim) -> Result<(), ArpError>;
}

/// Announce and log the outcome. Returns whether the frame went out.
///
/// Failures are logged and swallowed so the caller's loop keeps retrying
/// on its next tick.
pub fn announce_logged(announcer: &dyn Announcer, claim: &VipClaim) -> bool {
    match announcer.announce(claim) {
        Ok(()) => {
            info!(vip = %claim.address, mac = %claim.mac, interface = %claim.interface, "gratuitous ARP sent");
            true
        }
        Err(e) => {
            warn!(vip = %claim.address, interface = %claim.interface, error = %e, "failed to send gratuitous ARP");
            false
        }
    }
}
