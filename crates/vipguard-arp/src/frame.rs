//! Gratuitous ARP frame layout.
//!
//! ```text
//! Ethernet: dst ff:ff:ff:ff:ff:ff | src <mac> | type 0x0806
//! ARP:      htype 1 | ptype 0x0800 | hlen 6 | plen 4 | op 1 (request)
//!           sha <mac> | spa <vip> | tha 00:00:00:00:00:00 | tpa <vip>
//! ```
//!
//! The frame is zero-padded to the 60-byte Ethernet minimum since raw
//! packet sockets hand it to the driver as-is.

use std::net::Ipv4Addr;

use vipguard_core::MacAddress;

/// Minimum Ethernet frame length without FCS.
pub const ARP_FRAME_LEN: usize = 60;

pub const ETHERTYPE_ARP: u16 = 0x0806;
const ETHERTYPE_IPV4: u16 = 0x0800;
const HTYPE_ETHERNET: u16 = 1;
const OP_REQUEST: u16 = 1;

pub fn build_gratuitous_arp(vip: Ipv4Addr, mac: MacAddress) -> [u8; ARP_FRAME_LEN] {
    let mut frame = [0u8; ARP_FRAME_LEN];
    let mac = mac.octets();
    let ip = vip.octets();

    // Ethernet header.
    frame[0..6].copy_from_slice(&MacAddress::BROADCAST.octets());
    frame[6..12].copy_from_slice(&mac);
    frame[12..14].copy_from_slice(&ETHERTYPE_ARP.to_be_bytes());

    // ARP payload.
    frame[14..16].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
    frame[16..18].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
    frame[18] = 6;
    frame[19] = 4;
    frame[20..22].copy_from_slice(&OP_REQUEST.to_be_bytes());
    frame[22..28].copy_from_slice(&mac);
    frame[28..32].copy_from_slice(&ip);
    frame[32..38].copy_from_slice(&MacAddress::ZERO.octets());
    frame[38..42].copy_from_slice(&ip);

    frame
}
