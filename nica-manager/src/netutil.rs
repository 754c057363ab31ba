//! MAC/IP string conversions used by the custom-ring programmer and the
//! hypervisor wire format (spec §4.3, §6). Ported from
//! `original_source/manager/util.py` and `nica.py`'s `inet_aton`.

use std::net::Ipv4Addr;

use crate::error::{NicaError, Result};

/// `bytes -> "aa:bb:cc:dd:ee:ff"`.
pub fn mac_to_str(mac: [u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// `"aa:bb:cc:dd:ee:ff" -> bytes`.
pub fn str_to_mac(s: &str) -> Result<[u8; 6]> {
    let mut out = [0u8; 6];
    let mut parts = s.split(':');
    for slot in out.iter_mut() {
        let part = parts.next().ok_or(NicaError::Invalid)?;
        *slot = u8::from_str_radix(part, 16).map_err(|_| NicaError::Invalid)?;
    }
    if parts.next().is_some() {
        return Err(NicaError::Invalid);
    }
    Ok(out)
}

/// Dotted-quad string -> big-endian `u32`, matching `inet_aton` in
/// `nica.py` (`ip_address(ip).packed`, big-endian).
pub fn inet_aton(ip: &str) -> Result<u32> {
    let addr: Ipv4Addr = ip.parse().map_err(|_| NicaError::Invalid)?;
    Ok(u32::from_be_bytes(addr.octets()))
}

/// Big-endian `u32` -> dotted-quad string, matching `inet_ntoa` in
/// `original_source/manager/util.py`.
pub fn inet_ntoa(ip: u32) -> String {
    Ipv4Addr::from(ip.to_be_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_round_trips() {
        let mac = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        assert_eq!(str_to_mac(&mac_to_str(mac)).unwrap(), mac);
    }

    #[test]
    fn ip_round_trips() {
        let ip = "10.0.0.1";
        assert_eq!(inet_ntoa(inet_aton(ip).unwrap()), ip);
    }

    #[test]
    fn fpga_identity_constants_parse() {
        assert_eq!(str_to_mac("00:00:00:00:00:01").unwrap(), [0, 0, 0, 0, 0, 1]);
        assert_eq!(inet_aton("10.0.0.1").unwrap(), 0x0a000001);
    }
}
