//! Resolve an interface's IPv4 address and MAC, mirroring the `netifaces`
//! calls in `original_source/manager/nica_manager.py` (`Netdev.__init__`
//! and `Netdev.initialize`).

use std::ffi::CStr;
use std::mem;

use tracing::warn;

use crate::error::{NicaError, Result};

/// First IPv4 address bound to `ifname`. Warns (does not fail) if more
/// than one is present, matching the original's "only the first IP
/// address will be used" warning.
pub fn ipv4_address(ifname: &str) -> Result<u32> {
    let mut found: Vec<u32> = Vec::new();
    walk_ifaddrs(ifname, |ifa| {
        if ifa.ifa_addr.is_null() {
            return;
        }
        unsafe {
            if (*ifa.ifa_addr).sa_family as i32 == libc::AF_INET {
                let sin = ifa.ifa_addr as *const libc::sockaddr_in;
                found.push((*sin).sin_addr.s_addr.to_be());
            }
        }
    })?;

    if found.is_empty() {
        return Err(NicaError::NoDevice);
    }
    if found.len() > 1 {
        warn!(ifname, "interface has multiple IPv4 addresses; only the first will be used");
    }
    Ok(found[0])
}

/// The interface's link-layer (MAC) address, read from an `AF_PACKET`
/// entry in `getifaddrs` (Linux).
pub fn mac_address(ifname: &str) -> Result<[u8; 6]> {
    let mut found: Option<[u8; 6]> = None;
    walk_ifaddrs(ifname, |ifa| {
        if found.is_some() || ifa.ifa_addr.is_null() {
            return;
        }
        unsafe {
            if (*ifa.ifa_addr).sa_family as i32 == libc::AF_PACKET {
                let sll = ifa.ifa_addr as *const libc::sockaddr_ll;
                let mut mac = [0u8; 6];
                mac.copy_from_slice(&(*sll).sll_addr[..6]);
                found = Some(mac);
            }
        }
    })?;
    found.ok_or(NicaError::NoDevice)
}

fn walk_ifaddrs(ifname: &str, mut visit: impl FnMut(&libc::ifaddrs)) -> Result<()> {
    unsafe {
        let mut head: *mut libc::ifaddrs = mem::zeroed();
        if libc::getifaddrs(&mut head) != 0 {
            return Err(NicaError::Io(std::io::Error::last_os_error()));
        }
        let mut cur = head;
        while !cur.is_null() {
            let ifa = &*cur;
            if !ifa.ifa_name.is_null() {
                let name = CStr::from_ptr(ifa.ifa_name).to_string_lossy();
                if name == ifname {
                    visit(ifa);
                }
            }
            cur = ifa.ifa_next;
        }
        libc::freeifaddrs(head);
    }
    Ok(())
}
