//! Fixed base addresses and top-level registers of the NICA block (spec
//! §4.3). Ported from the `NICA` class's addresses and `get_uuid`/
//! `update_credits`/`enable`/`disable` in `original_source/manager/nica.py`.

use uuid::Uuid;

use crate::error::Result;
use crate::hw::axi::AxiLite;
use crate::hw::arbiter::Arbiter;
use crate::hw::custom_ring::CustomRing;
use crate::hw::flow_table::FlowTable;
use crate::hw::gateway::Gateway;
use crate::hw::mmu::Mmu;

pub const N2H_FLOW_TABLE_BASE: u32 = 0x18;
pub const H2N_FLOW_TABLE_BASE: u32 = 0x418;
pub const IKERNEL0_GATEWAY_BASE: u32 = 0x1014;
pub const N2H_ARBITER_BASE: u32 = 0x58;
pub const H2N_ARBITER_BASE: u32 = 0x458;
pub const CUSTOM_RING_BASE: u32 = 0x78;
const UUID_BASE: u32 = 0x1000;
const N2H_ENABLE: u32 = 0x010;
const H2N_ENABLE: u32 = 0x410;
const CREDITS: u32 = 0x1050;

pub fn n2h_flow_table(axi: &mut dyn AxiLite) -> FlowTable<'_> {
    FlowTable::new(axi, N2H_FLOW_TABLE_BASE)
}

pub fn h2n_flow_table(axi: &mut dyn AxiLite) -> FlowTable<'_> {
    FlowTable::new(axi, H2N_FLOW_TABLE_BASE)
}

pub fn n2h_arbiter(axi: &mut dyn AxiLite) -> Arbiter<'_> {
    Arbiter::new(axi, N2H_ARBITER_BASE)
}

pub fn h2n_arbiter(axi: &mut dyn AxiLite) -> Arbiter<'_> {
    Arbiter::new(axi, H2N_ARBITER_BASE)
}

pub fn custom_ring(axi: &mut dyn AxiLite) -> CustomRing<'_> {
    CustomRing::new(axi, CUSTOM_RING_BASE)
}

pub fn mmu(axi: &mut dyn AxiLite) -> Mmu<'_> {
    Mmu::new(axi)
}

/// The ikernel-0 register gateway, indexed by logical ikernel *type*
/// (`Ikernel::index`), distinct from the per-instance `id` used by
/// `IKERNEL_SELECT` (spec §9 Open Question 2).
pub fn ikernel_gateway(axi: &mut dyn AxiLite, index: u32) -> Gateway<'_> {
    assert_eq!(index, 0, "only ikernel type 0 exists today");
    Gateway::new(axi, IKERNEL0_GATEWAY_BASE)
}

/// Read the UUID of the given ikernel index from four little-endian u32s.
pub fn get_uuid(axi: &mut dyn AxiLite, ikernel: u32) -> Result<Uuid> {
    assert_eq!(ikernel, 0);
    let mut bytes = [0u8; 16];
    for i in 0..4 {
        let word = axi.read32(UUID_BASE + i * 4, None)?;
        bytes[(i as usize) * 4..(i as usize) * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    Ok(Uuid::from_bytes(bytes))
}

/// Enable both flow-table directions' global switch.
pub fn enable(axi: &mut dyn AxiLite) -> Result<()> {
    axi.write32(N2H_ENABLE, 1, Some(10))?;
    axi.write32(H2N_ENABLE, 1, Some(10))
}

/// Disable both directions (spec §7 shutdown sequence).
pub fn disable(axi: &mut dyn AxiLite) -> Result<()> {
    axi.write32(N2H_ENABLE, 0, Some(10))?;
    axi.write32(H2N_ENABLE, 0, Some(10))
}

pub fn update_credits(axi: &mut dyn AxiLite, ring: u32, max_msn: u32, reset: bool) -> Result<()> {
    let cmd = ring | (max_msn << 7) | ((reset as u32) << 23);
    axi.write32(CREDITS, cmd, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::axi::SimAxi;

    #[test]
    fn uuid_is_read_little_endian_word_by_word() {
        let mut axi = SimAxi::new();
        axi.write32(UUID_BASE, 0x44332211, None).unwrap();
        axi.write32(UUID_BASE + 4, 0x88776655, None).unwrap();
        axi.write32(UUID_BASE + 8, 0xccbbaa99, None).unwrap();
        axi.write32(UUID_BASE + 12, 0x00ffeedd, None).unwrap();
        let uuid = get_uuid(&mut axi, 0).unwrap();
        assert_eq!(
            uuid,
            Uuid::from_bytes([
                0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
                0xee, 0xff, 0x00
            ])
        );
    }

    #[test]
    fn update_credits_packs_fields() {
        let mut axi = SimAxi::new();
        update_credits(&mut axi, 3, 5, true).unwrap();
        let cmd = axi.read32(CREDITS, None).unwrap();
        assert_eq!(cmd, 3 | (5 << 7) | (1 << 23));
    }
}
