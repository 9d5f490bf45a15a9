//! Raw `AF_PACKET` sender (Linux).
//!
//! The interface is picked by substring match against the kernel's
//! interface names, the first match in index order wins. Sending needs
//! `CAP_NET_RAW`.

use tracing::debug;

use vipguard_core::VipClaim;

use crate::frame::build_gratuitous_arp;
use crate::{Announcer, ArpError};

/// Announcer that opens a fresh packet socket per announcement.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawSocketAnnouncer;

impl Announcer for RawSocketAnnouncer {
    fn announce(&self, claim: &VipClaim) -> Result<(), ArpError> {
        let frame = build_gratuitous_arp(claim.address, claim.mac);
        let (name, index) = find_interface(&claim.interface)?;
        debug!(interface = %name, index, "sending gratuitous ARP");
        send_frame(index, &frame)
    }
}

/// List `(name, index)` for every interface the kernel knows about.
#[cfg(target_os = "linux")]
pub fn interfaces() -> Result<Vec<(String, u32)>, ArpError> {
    // SAFETY: if_nameindex returns a heap array terminated by a zero entry,
    // released with if_freenameindex once we have copied the names out.
    unsafe {
        let head = libc::if_nameindex();
        if head.is_null() {
            return Err(ArpError::Socket(std::io::Error::last_os_error()));
        }
        let mut out = Vec::new();
        let mut cursor = head;
        while (*cursor).if_index != 0 && !(*cursor).if_name.is_null() {
            let name = std::ffi::CStr::from_ptr((*cursor).if_name)
                .to_string_lossy()
                .into_owned();
            out.push((name, (*cursor).if_index));
            cursor = cursor.add(1);
        }
        libc::if_freenameindex(head);
        Ok(out)
    }
}

#[cfg(not(target_os = "linux"))]
pub fn interfaces() -> Result<Vec<(String, u32)>, ArpError> {
    Err(ArpError::Unsupported)
}

fn find_interface(selector: &str) -> Result<(String, u32), ArpError> {
    select_interface(interfaces()?, selector)
        .ok_or_else(|| ArpError::InterfaceNotFound(selector.to_string()))
}

fn select_interface(candidates: Vec<(String, u32)>, selector: &str) -> Option<(String, u32)> {
    candidates.into_iter().find(|(name, _)| name.contains(selector))
}

#[cfg(target_os = "linux")]
fn send_frame(if_index: u32, frame: &[u8]) -> Result<(), ArpError> {
    use crate::frame::ETHERTYPE_ARP;

    let protocol = ETHERTYPE_ARP.to_be() as libc::c_int;

    // SAFETY: plain socket syscalls on a descriptor we own and close on
    // every path; the sockaddr_ll is fully initialised before use.
    unsafe {
        let fd = libc::socket(libc::AF_PACKET, libc::SOCK_RAW, protocol);
        if fd < 0 {
            return Err(ArpError::Socket(std::io::Error::last_os_error()));
        }

        let mut addr: libc::sockaddr_ll = std::mem::zeroed();
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = ETHERTYPE_ARP.to_be();
        addr.sll_ifindex = if_index as libc::c_int;
        addr.sll_halen = 6;
        addr.sll_addr[..6].copy_from_slice(&[0xff; 6]);

        let sent = libc::sendto(
            fd,
            frame.as_ptr() as *const libc::c_void,
            frame.len(),
            0,
            &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        );
        let send_err = std::io::Error::last_os_error();
        libc::close(fd);

        if sent < 0 {
            return Err(ArpError::Socket(send_err));
        }
        if sent as usize != frame.len() {
            return Err(ArpError::ShortSend {
                sent: sent as usize,
                expected: frame.len(),
            });
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn send_frame(_if_index: u32, _frame: &[u8]) -> Result<(), ArpError> {
    Err(ArpError::Unsupported)
}
