//! Opcodes and fixed-width request/response bodies for both RPC surfaces
//! (spec §4.7-§4.9). Each body is encoded as explicit little-endian bytes,
//! mirroring the `struct.pack`/`struct.unpack` calls throughout
//! `original_source/manager/nica_manager.py` rather than relying on any
//! host-endian in-memory layout.

use uuid::Uuid;

use crate::error::{NicaError, Result};

fn need(buf: &[u8], len: usize) -> Result<()> {
    if buf.len() < len {
        Err(NicaError::Invalid)
    } else {
        Ok(())
    }
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

// ---------------------------------------------------------------- client --

/// Opcodes accepted on the host-local UNIX domain socket (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ClientOpcode {
    IkCreate = 1,
    IkDestroy = 2,
    IkRpc = 3,
    IkAttach = 4,
    IkDetach = 5,
    CrCreate = 6,
    CrDestroy = 7,
    CrUpdateCredits = 8,
}

impl TryFrom<u16> for ClientOpcode {
    type Error = NicaError;

    fn try_from(value: u16) -> Result<Self> {
        Ok(match value {
            1 => ClientOpcode::IkCreate,
            2 => ClientOpcode::IkDestroy,
            3 => ClientOpcode::IkRpc,
            4 => ClientOpcode::IkAttach,
            5 => ClientOpcode::IkDetach,
            6 => ClientOpcode::CrCreate,
            7 => ClientOpcode::CrDestroy,
            8 => ClientOpcode::CrUpdateCredits,
            _ => return Err(NicaError::NoSys),
        })
    }
}

pub struct IkCreateReq {
    pub netdev_name: [u8; 16],
    pub uuid: Uuid,
}

impl IkCreateReq {
    pub const LEN: u16 = 32;
    pub fn decode(buf: &[u8]) -> Result<Self> {
        need(buf, 32)?;
        let mut netdev_name = [0u8; 16];
        netdev_name.copy_from_slice(&buf[0..16]);
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes.copy_from_slice(&buf[16..32]);
        Ok(IkCreateReq {
            netdev_name,
            uuid: Uuid::from_bytes(uuid_bytes),
        })
    }

    /// The requested netdev name, stripped of its trailing NUL padding.
    pub fn netdev_name_str(&self) -> &str {
        let end = self
            .netdev_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.netdev_name.len());
        std::str::from_utf8(&self.netdev_name[..end]).unwrap_or("")
    }
}

pub fn encode_ikernel_id(id: u32) -> Vec<u8> {
    id.to_le_bytes().to_vec()
}

pub fn decode_ikernel_id(buf: &[u8]) -> Result<u32> {
    need(buf, 4)?;
    Ok(u32_at(buf, 0))
}

pub fn encode_flow(ip: u32, port: u16) -> Vec<u8> {
    let mut buf = vec![0u8; 8];
    buf[0..4].copy_from_slice(&ip.to_le_bytes());
    buf[4..6].copy_from_slice(&port.to_le_bytes());
    buf
}

pub struct IkRpcReq {
    pub ikernel_id: u32,
    pub addr: u32,
    pub value: u32,
    pub write: bool,
}

impl IkRpcReq {
    pub const LEN: u16 = 13;
    pub fn decode(buf: &[u8]) -> Result<Self> {
        need(buf, 13)?;
        Ok(IkRpcReq {
            ikernel_id: u32_at(buf, 0),
            addr: u32_at(buf, 4),
            value: u32_at(buf, 8),
            write: buf[12] != 0,
        })
    }
}

pub fn encode_value(value: u32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

pub fn decode_value(buf: &[u8]) -> Result<u32> {
    need(buf, 4)?;
    Ok(u32_at(buf, 0))
}

pub struct CrCreateReq {
    pub ikernel_id: u32,
    pub qpn: u32,
}

impl CrCreateReq {
    pub const LEN: u16 = 8;
    pub fn decode(buf: &[u8]) -> Result<Self> {
        need(buf, 8)?;
        Ok(CrCreateReq {
            ikernel_id: u32_at(buf, 0),
            qpn: u32_at(buf, 4),
        })
    }
}

pub fn encode_ring_id(id: u32) -> Vec<u8> {
    id.to_le_bytes().to_vec()
}

pub fn decode_ring_id(buf: &[u8]) -> Result<u32> {
    need(buf, 4)?;
    Ok(u32_at(buf, 0))
}

pub struct CrUpdateCreditsReq {
    pub ring_id: u32,
    pub max_msn: u32,
    pub reset: bool,
}

impl CrUpdateCreditsReq {
    pub const LEN: u16 = 9;
    pub fn decode(buf: &[u8]) -> Result<Self> {
        need(buf, 9)?;
        Ok(CrUpdateCreditsReq {
            ring_id: u32_at(buf, 0),
            max_msn: u32_at(buf, 4),
            reset: buf[8] != 0,
        })
    }
}

// ------------------------------------------------------------ hypervisor --

/// Opcodes exchanged over a paravirtual (virtio-serial) channel between a
/// guest's manager and the host's (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum HypervisorOpcode {
    ConfigCustomRing = 1,
    NumRings = 2,
    GetUuids = 3,
    AllocateIkernel = 4,
    DeallocateIkernel = 5,
    Attach = 6,
    Detach = 7,
    CrCreate = 8,
    CrDestroy = 9,
    UpdateCredits = 10,
    Rpc = 11,
}

impl TryFrom<u16> for HypervisorOpcode {
    type Error = NicaError;

    fn try_from(value: u16) -> Result<Self> {
        Ok(match value {
            1 => HypervisorOpcode::ConfigCustomRing,
            2 => HypervisorOpcode::NumRings,
            3 => HypervisorOpcode::GetUuids,
            4 => HypervisorOpcode::AllocateIkernel,
            5 => HypervisorOpcode::DeallocateIkernel,
            6 => HypervisorOpcode::Attach,
            7 => HypervisorOpcode::Detach,
            8 => HypervisorOpcode::CrCreate,
            9 => HypervisorOpcode::CrDestroy,
            10 => HypervisorOpcode::UpdateCredits,
            11 => HypervisorOpcode::Rpc,
            _ => return Err(NicaError::NoSys),
        })
    }
}

pub struct ConfigCustomRingReq {
    pub mac: [u8; 6],
    pub ip: u32,
}

impl ConfigCustomRingReq {
    pub const LEN: u16 = 12;
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 12];
        buf[0..6].copy_from_slice(&self.mac);
        buf[8..12].copy_from_slice(&self.ip.to_le_bytes());
        buf
    }
    pub fn decode(buf: &[u8]) -> Result<Self> {
        need(buf, 12)?;
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&buf[0..6]);
        Ok(ConfigCustomRingReq {
            mac,
            ip: u32_at(buf, 8),
        })
    }
}

pub fn decode_num_rings(buf: &[u8]) -> Result<u32> {
    need(buf, 4)?;
    Ok(u32_at(buf, 0))
}

pub fn encode_num_rings(n: u32) -> Vec<u8> {
    n.to_le_bytes().to_vec()
}

/// `GET_UUIDS` response: a count followed by that many 16-byte UUIDs.
/// Today exactly one ikernel type exists, so `count` is always `1`
/// (spec §9 Open Question 2).
pub fn encode_uuids(uuids: &[Uuid]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + uuids.len() * 16);
    buf.extend_from_slice(&(uuids.len() as u32).to_le_bytes());
    for u in uuids {
        buf.extend_from_slice(u.as_bytes());
    }
    buf
}

pub fn decode_uuids(buf: &[u8]) -> Result<Vec<Uuid>> {
    need(buf, 4)?;
    let count = u32_at(buf, 0) as usize;
    need(buf, 4 + count * 16)?;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let off = 4 + i * 16;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&buf[off..off + 16]);
        out.push(Uuid::from_bytes(bytes));
    }
    Ok(out)
}

pub fn encode_uuid(uuid: Uuid) -> Vec<u8> {
    uuid.as_bytes().to_vec()
}

pub fn decode_uuid(buf: &[u8]) -> Result<Uuid> {
    need(buf, 16)?;
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&buf[0..16]);
    Ok(Uuid::from_bytes(bytes))
}

pub struct HvAttachReq {
    pub ikernel_id: u32,
    pub ip: u32,
    pub port: u16,
}

impl HvAttachReq {
    pub const LEN: u16 = 12;
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 12];
        buf[0..4].copy_from_slice(&self.ikernel_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.ip.to_le_bytes());
        buf[8..10].copy_from_slice(&self.port.to_le_bytes());
        buf
    }
    pub fn decode(buf: &[u8]) -> Result<Self> {
        need(buf, 12)?;
        Ok(HvAttachReq {
            ikernel_id: u32_at(buf, 0),
            ip: u32_at(buf, 4),
            port: u16_at(buf, 8),
        })
    }
}

pub struct HvAttachResp {
    pub h2n_id: u32,
    pub n2h_id: u32,
}

impl HvAttachResp {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 8];
        buf[0..4].copy_from_slice(&self.h2n_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.n2h_id.to_le_bytes());
        buf
    }
    pub fn decode(buf: &[u8]) -> Result<Self> {
        need(buf, 8)?;
        Ok(HvAttachResp {
            h2n_id: u32_at(buf, 0),
            n2h_id: u32_at(buf, 4),
        })
    }
}
