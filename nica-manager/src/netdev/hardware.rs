//! Direct-hardware backend (spec §4.4). Ported from `NetdevHardware` in
//! `original_source/manager/nica_manager.py`.

use crate::error::{NicaError, Result};
use crate::flow::{Flow, ANY_IP, ANY_PORT};
use crate::hw::axi::{AxiLite, HardwareAxi};
use crate::hw::flow_table::{self, is_failure_id};
use crate::hw::nica_top;
use crate::idpool::IdPool;
use crate::netdev::ifaddr;
use crate::netdev::NetdevCommon;
use crate::netutil::{inet_ntoa, mac_to_str};

/// The NIC's own fixed identity on the fabric (spec §4.4 `initialize`).
const FPGA_MAC: [u8; 6] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x01];
const FPGA_IP: &str = "10.0.0.1";

const MAX_IKERNELS: u32 = 1024;

pub struct HardwareNetdev {
    pub(crate) common: NetdevCommon,
    axi: Box<dyn AxiLite>,
    ikernel_pool: IdPool,
    ring_pool: IdPool,
    /// Default ring destination: the host interface's own MAC/IP, captured
    /// at `initialize()` time (spec §4.4; `original_source`'s
    /// `configure_custom_ring` stores these for later `cr_create` defaults
    /// rather than writing the destination registers up front).
    host_mac: [u8; 6],
    host_ip: String,
}

impl HardwareNetdev {
    pub fn new(ifname: &str, mst_path: &str) -> Result<Self> {
        let mut axi: Box<dyn AxiLite> = Box::new(HardwareAxi::open(mst_path)?);
        let ip = ifaddr::ipv4_address(ifname)?;

        nica_top::enable(axi.as_mut())?;
        nica_top::n2h_flow_table(axi.as_mut()).set_mask(false, true, false, true)?;
        nica_top::h2n_flow_table(axi.as_mut()).set_mask(true, false, true, false)?;

        Ok(HardwareNetdev {
            common: NetdevCommon::new(ifname.to_string(), ip),
            axi,
            ikernel_pool: IdPool::with_max(MAX_IKERNELS),
            ring_pool: IdPool::new(-1, None),
            host_mac: [0; 6],
            host_ip: String::new(),
        })
    }

    /// Program the custom ring's source identity to the FPGA's fixed
    /// address, discover the ring count, and fetch the ikernel type
    /// catalogue (spec §4.4 `initialize`).
    pub fn initialize(&mut self) -> Result<()> {
        self.host_mac = ifaddr::mac_address(&self.common.ifname)?;
        self.host_ip = inet_ntoa(self.common.ip);

        let mut cr = nica_top::custom_ring(self.axi.as_mut());
        cr.set_mac(true, FPGA_MAC)?;
        cr.set_ip(true, FPGA_IP)?;
        let num_rings = cr.num_rings()?;
        self.ring_pool = IdPool::with_max(num_rings);

        self.common.uuids = vec![nica_top::get_uuid(self.axi.as_mut(), 0)?];

        tracing::info!(
            ifname = %self.common.ifname,
            mac = %mac_to_str(self.host_mac),
            num_rings,
            "hardware netdev initialized"
        );
        Ok(())
    }

    pub(crate) fn allocate_ikernel(&mut self) -> Result<u32> {
        self.ikernel_pool.get_id()
    }

    /// No hardware context reset is performed on deallocate (spec §4.4,
    /// §9 Open Question 1 — left unspecified by the original; the ikernel
    /// id is simply returned to the pool).
    pub(crate) fn deallocate_ikernel(&mut self, id: u32) -> Result<()> {
        self.ikernel_pool.release_id(id);
        Ok(())
    }

    /// Program the h2n entry, then the n2h entry; on n2h failure,
    /// best-effort delete the h2n entry before surfacing `Invalid`
    /// (spec §7, §9 Open Question 3).
    pub(crate) fn attach(&mut self, flow: Flow, index: u32, ikernel_id: u32) -> Result<(u32, u32)> {
        let h2n_id = {
            let mut h2n = nica_top::h2n_flow_table(self.axi.as_mut());
            h2n.set_flow(
                flow.ip,
                flow.port,
                ANY_IP,
                ANY_PORT,
                flow_table::ACTION_IKERNEL,
                index,
                ikernel_id,
            )?
        };
        if is_failure_id(h2n_id) {
            return Err(NicaError::Invalid);
        }

        let n2h_id = {
            let mut n2h = nica_top::n2h_flow_table(self.axi.as_mut());
            n2h.set_flow(
                ANY_IP,
                ANY_PORT,
                flow.ip,
                flow.port,
                flow_table::ACTION_IKERNEL,
                index,
                ikernel_id,
            )?
        };
        if is_failure_id(n2h_id) {
            let mut h2n = nica_top::h2n_flow_table(self.axi.as_mut());
            if let Err(e) = h2n.del_flow(flow.ip, flow.port, ANY_IP, ANY_PORT) {
                tracing::warn!(error = %e, "failed to roll back orphaned h2n entry");
            }
            return Err(NicaError::Invalid);
        }

        Ok((h2n_id, n2h_id))
    }

    pub(crate) fn detach(&mut self, flow: Flow) -> Result<()> {
        let h2n_result = {
            let mut h2n = nica_top::h2n_flow_table(self.axi.as_mut());
            h2n.del_flow(flow.ip, flow.port, ANY_IP, ANY_PORT)
        };
        let n2h_result = {
            let mut n2h = nica_top::n2h_flow_table(self.axi.as_mut());
            n2h.del_flow(ANY_IP, ANY_PORT, flow.ip, flow.port)
        };
        match (h2n_result, n2h_result) {
            (Ok(h2n_id), Ok(n2h_id)) if !is_failure_id(h2n_id) && !is_failure_id(n2h_id) => Ok(()),
            (Ok(_), Ok(_)) => Err(NicaError::NotFound),
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }

    pub(crate) fn invoke_rpc(
        &mut self,
        index: u32,
        ikernel_id: u32,
        addr: u32,
        value: u32,
        write: bool,
    ) -> Result<u32> {
        let mut gw = nica_top::ikernel_gateway(self.axi.as_mut(), index);
        if write {
            gw.write(addr, value, Some(ikernel_id))?;
            Ok(0)
        } else {
            gw.read(addr, Some(ikernel_id))
        }
    }

    pub(crate) fn cr_create(&mut self, qpn: u32) -> Result<u32> {
        let ring_id = self.ring_pool.get_id()?;
        let mut cr = nica_top::custom_ring(self.axi.as_mut());
        if let Err(e) = cr.set_custom_ring(ring_id, self.host_mac, &self.host_ip, qpn, 0) {
            self.ring_pool.release_id(ring_id);
            return Err(e);
        }
        if let Err(e) = nica_top::update_credits(self.axi.as_mut(), ring_id, 0, true) {
            self.ring_pool.release_id(ring_id);
            return Err(e);
        }
        Ok(ring_id)
    }

    pub(crate) fn cr_destroy(&mut self, ring_id: u32) -> Result<()> {
        let mut cr = nica_top::custom_ring(self.axi.as_mut());
        cr.set_custom_ring(ring_id, [0; 6], "0.0.0.0", 0, 0)?;
        self.ring_pool.release_id(ring_id);
        Ok(())
    }

    pub(crate) fn update_credits(&mut self, ring_id: u32, max_msn: u32, reset: bool) -> Result<()> {
        nica_top::update_credits(self.axi.as_mut(), ring_id, max_msn, reset)
    }

    pub(crate) fn disable(&mut self) -> Result<()> {
        nica_top::disable(self.axi.as_mut())
    }

    pub(crate) fn num_rings(&mut self) -> Result<u32> {
        nica_top::custom_ring(self.axi.as_mut()).num_rings()
    }

    /// Build a `HardwareNetdev` over an in-memory [`crate::hw::axi::SimAxi`]
    /// instead of a real MST device, already past the steps `initialize()`
    /// would otherwise perform. Used by unit and integration tests; the
    /// role `original_source/manager/nica.py::NicaSimulation` plays for the
    /// Python implementation.
    pub fn for_simulation(ifname: &str, ip: u32, num_rings: u32) -> Self {
        use crate::hw::axi::SimAxi;
        let mut axi = SimAxi::new();
        nica_top::enable(&mut axi).expect("SimAxi writes never fail");
        nica_top::n2h_flow_table(&mut axi).set_mask(false, true, false, true).unwrap();
        nica_top::h2n_flow_table(&mut axi).set_mask(true, false, true, false).unwrap();
        HardwareNetdev {
            common: NetdevCommon::new(ifname.to_string(), ip),
            axi: Box::new(axi),
            ikernel_pool: IdPool::with_max(MAX_IKERNELS),
            ring_pool: IdPool::with_max(num_rings),
            host_mac: [0x02, 0, 0, 0, 0, 1],
            host_ip: crate::netutil::inet_ntoa(ip),
        }
    }

    /// Seed the ikernel-type catalogue directly, bypassing the hardware
    /// UUID registers (test/simulation only).
    pub fn set_uuids_for_simulation(&mut self, uuids: Vec<uuid::Uuid>) {
        self.common.uuids = uuids;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_for_test() -> HardwareNetdev {
        HardwareNetdev::for_simulation("eth0", 0x0a00_0002, 16)
    }

    #[test]
    fn ring_pool_id_is_released_when_hardware_program_fails() {
        // SimAxi never fails set_custom_ring, so this exercises only the
        // allocate/release bookkeeping path, not the rollback branch.
        let mut netdev = new_for_test();
        let ring = netdev.cr_create(7).unwrap();
        assert_eq!(ring, 0);
        netdev.cr_destroy(ring).unwrap();
        assert_eq!(netdev.cr_create(8).unwrap(), 0);
    }

    #[test]
    fn deallocate_releases_id_for_reuse() {
        let mut netdev = new_for_test();
        let id = netdev.allocate_ikernel().unwrap();
        netdev.deallocate_ikernel(id).unwrap();
        assert_eq!(netdev.allocate_ikernel().unwrap(), id);
    }
}
