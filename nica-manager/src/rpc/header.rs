//! Fixed 8-byte RPC header (spec §4.7): `opcode, length, flags, status`,
//! each a little-endian `u16`. Ported from the `Struct('HHHH')` used
//! throughout `original_source/manager/nica_manager.py`; that struct packs
//! in host-native order, which is little-endian on every deployment target
//! this manager runs on, so the wire format is pinned to little-endian
//! rather than re-deriving it from the AXI shell-version swap rule (see
//! DESIGN.md).

pub const HEADER_LEN: usize = 8;

/// `flags` bit 0: this message is a request (vs. a response).
pub const FLAG_REQUEST: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub opcode: u16,
    pub length: u16,
    pub flags: u16,
    pub status: u16,
}

impl Header {
    pub fn request(opcode: u16, length: u16) -> Self {
        Header {
            opcode,
            length,
            flags: FLAG_REQUEST,
            status: 0,
        }
    }

    pub fn response(opcode: u16, length: u16, status: u16) -> Self {
        Header {
            opcode,
            length,
            flags: 0,
            status,
        }
    }

    pub fn is_request(&self) -> bool {
        self.flags & FLAG_REQUEST != 0
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..2].copy_from_slice(&self.opcode.to_le_bytes());
        buf[2..4].copy_from_slice(&self.length.to_le_bytes());
        buf[4..6].copy_from_slice(&self.flags.to_le_bytes());
        buf[6..8].copy_from_slice(&self.status.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Self {
        Header {
            opcode: u16::from_le_bytes([buf[0], buf[1]]),
            length: u16::from_le_bytes([buf[2], buf[3]]),
            flags: u16::from_le_bytes([buf[4], buf[5]]),
            status: u16::from_le_bytes([buf[6], buf[7]]),
        }
    }
}

/// The reserved 4-byte body an error response carries instead of the
/// opcode's usual response struct (spec §4.7: "this 'empty struct' exists
/// to avoid zero-length structures").
pub const EMPTY_BODY_LEN: u16 = 4;
pub const EMPTY_BODY: [u8; 4] = [0u8; 4];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let hdr = Header {
            opcode: 4,
            length: 8,
            flags: FLAG_REQUEST,
            status: 0,
        };
        assert_eq!(Header::decode(&hdr.encode()), hdr);
    }

    #[test]
    fn request_flag_is_set_only_on_requests() {
        assert!(Header::request(1, 0).is_request());
        assert!(!Header::response(1, 0, 0).is_request());
    }
}
