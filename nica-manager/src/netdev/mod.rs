//! The netdev facade (spec §4.4): orchestrates ikernel/flow/ring lifecycle
//! over whichever backend owns the hardware — direct FPGA register access
//! or forwarding to a hypervisor. Ported from the `Netdev` abstract base
//! class in `original_source/manager/nica_manager.py`, which keeps the
//! bookkeeping (`ik_create`, `ik_attach`, `ik_detach`, `ik_rpc`, ...)
//! concrete on the base class and leaves only the hardware-touching leaf
//! operations (`configure_custom_ring`, `attach`, `cr_create`, ...)
//! abstract. Here that split becomes an `enum` with inherent dispatch (spec
//! §4.4 Rust realization note) rather than a trait object.

pub mod hardware;
pub mod ifaddr;
pub mod paravirt;

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{NicaError, Result};
use crate::flow::Flow;
use crate::ikernel::Ikernel;

pub use hardware::HardwareNetdev;
pub use paravirt::ParavirtNetdev;

/// State common to both backends (spec §3 `Netdev` fields minus the
/// backend-specific pools/transport).
pub struct NetdevCommon {
    pub ifname: String,
    pub ip: u32,
    pub uuids: Vec<Uuid>,
    pub ikernels: HashMap<u32, Ikernel>,
    /// Installed flow -> (owning ikernel id, h2n flow id, n2h flow id).
    pub flows: HashMap<Flow, (u32, u32, u32)>,
}

impl NetdevCommon {
    pub fn new(ifname: String, ip: u32) -> Self {
        NetdevCommon {
            ifname,
            ip,
            uuids: Vec::new(),
            ikernels: HashMap::new(),
            flows: HashMap::new(),
        }
    }

    fn get_ikernel(&self, id: u32) -> Result<&Ikernel> {
        self.ikernels.get(&id).ok_or(NicaError::NotFound)
    }

    fn get_ikernel_mut(&mut self, id: u32) -> Result<&mut Ikernel> {
        self.ikernels.get_mut(&id).ok_or(NicaError::NotFound)
    }

    fn index_of_uuid(&self, uuid: Uuid) -> Result<u32> {
        self.uuids
            .iter()
            .position(|u| *u == uuid)
            .map(|i| i as u32)
            .ok_or(NicaError::NotFound)
    }

    pub fn clone_uuids(&self) -> Vec<Uuid> {
        self.uuids.clone()
    }
}

pub enum Netdev {
    Hardware(HardwareNetdev),
    Paravirt(ParavirtNetdev),
}

impl Netdev {
    pub fn common(&self) -> &NetdevCommon {
        match self {
            Netdev::Hardware(h) => &h.common,
            Netdev::Paravirt(p) => &p.common,
        }
    }

    fn common_mut(&mut self) -> &mut NetdevCommon {
        match self {
            Netdev::Hardware(h) => &mut h.common,
            Netdev::Paravirt(p) => &mut p.common,
        }
    }

    pub fn ifname(&self) -> &str {
        &self.common().ifname
    }

    pub fn ip(&self) -> u32 {
        self.common().ip
    }

    pub fn ikernel(&self, id: u32) -> Result<&Ikernel> {
        self.common().get_ikernel(id)
    }

    /// Allocate an ikernel of the hardware type named by `uuid` (spec §4.4
    /// `ik_create` / `allocate_ikernel`).
    pub async fn ik_create(&mut self, uuid: Uuid) -> Result<u32> {
        let index = self.common().index_of_uuid(uuid)?;
        let id = match self {
            Netdev::Hardware(h) => h.allocate_ikernel()?,
            Netdev::Paravirt(p) => p.allocate_ikernel(uuid).await?,
        };
        self.common_mut()
            .ikernels
            .insert(id, Ikernel::new(index, id));
        Ok(id)
    }

    /// Tear down an ikernel, releasing every flow and ring it still owns
    /// (spec §4.6 `ik_destroy`).
    pub async fn ik_destroy(&mut self, id: u32) -> Result<()> {
        let ik = self.common().get_ikernel(id)?.clone();
        for flow in ik.flows.iter().copied() {
            // Best-effort: an ikernel's own bookkeeping should never go
            // stale, but detach errors must not block the rest of teardown.
            let _ = self.ik_detach(id, flow).await;
        }
        for ring in ik.rings.iter().copied() {
            let _ = self.cr_destroy(ring).await;
        }
        match self {
            Netdev::Hardware(h) => h.deallocate_ikernel(id)?,
            Netdev::Paravirt(p) => p.deallocate_ikernel(id).await?,
        }
        self.common_mut().ikernels.remove(&id);
        Ok(())
    }

    /// Bind `flow` (after resolving any wildcard IP) to `ikernel_id` (spec
    /// §4.4 `ik_attach`). Fails with [`NicaError::AddrInUse`] if the bound
    /// flow is already attached.
    pub async fn ik_attach(&mut self, ikernel_id: u32, flow: Flow) -> Result<Flow> {
        let flow = flow.bind_local(self.ip());
        self.common().get_ikernel(ikernel_id)?;
        if self.common().flows.contains_key(&flow) {
            return Err(NicaError::AddrInUse);
        }
        let index = self.common().get_ikernel(ikernel_id)?.index;
        let (h2n, n2h) = match self {
            Netdev::Hardware(h) => h.attach(flow, index, ikernel_id)?,
            Netdev::Paravirt(p) => p.attach(flow, ikernel_id).await?,
        };
        self.common_mut()
            .flows
            .insert(flow, (ikernel_id, h2n, n2h));
        self.common_mut()
            .get_ikernel_mut(ikernel_id)?
            .flows
            .insert(flow);
        Ok(flow)
    }

    /// Detach `flow`, which must currently belong to `ikernel_id` (spec
    /// §4.4 `ik_detach`).
    pub async fn ik_detach(&mut self, ikernel_id: u32, flow: Flow) -> Result<()> {
        let flow = flow.bind_local(self.ip());
        let (owner, _, _) = *self.common().flows.get(&flow).ok_or(NicaError::NotFound)?;
        if owner != ikernel_id {
            return Err(NicaError::NotFound);
        }
        let outcome = match self {
            Netdev::Hardware(h) => h.detach(flow),
            Netdev::Paravirt(p) => p.detach(flow).await,
        };
        self.common_mut().flows.remove(&flow);
        if let Ok(ik) = self.common_mut().get_ikernel_mut(ikernel_id) {
            ik.flows.remove(&flow);
        }
        outcome
    }

    /// Invoke an ikernel-private register operation (spec §4.4 `ik_rpc`).
    pub async fn ik_rpc(&mut self, ikernel_id: u32, addr: u32, value: u32, write: bool) -> Result<u32> {
        let index = self.common().get_ikernel(ikernel_id)?.index;
        match self {
            Netdev::Hardware(h) => h.invoke_rpc(index, ikernel_id, addr, value, write),
            Netdev::Paravirt(p) => p.invoke_rpc(ikernel_id, addr, value, write).await,
        }
    }

    /// Create a custom (RoCE) ring for `ikernel_id` bound to `qpn` (spec
    /// §4.4/§4.9 `cr_create`).
    pub async fn cr_create(&mut self, ikernel_id: u32, qpn: u32) -> Result<u32> {
        self.common().get_ikernel(ikernel_id)?;
        let ring_id = match self {
            Netdev::Hardware(h) => h.cr_create(qpn)?,
            Netdev::Paravirt(p) => p.cr_create(ikernel_id, qpn).await?,
        };
        self.common_mut()
            .get_ikernel_mut(ikernel_id)?
            .rings
            .insert(ring_id);
        Ok(ring_id)
    }

    pub async fn cr_destroy(&mut self, ring_id: u32) -> Result<()> {
        match self {
            Netdev::Hardware(h) => h.cr_destroy(ring_id)?,
            Netdev::Paravirt(p) => p.cr_destroy(ring_id).await?,
        }
        for ik in self.common_mut().ikernels.values_mut() {
            ik.rings.remove(&ring_id);
        }
        Ok(())
    }

    pub async fn cr_update_credits(&mut self, ring_id: u32, max_msn: u32, reset: bool) -> Result<()> {
        match self {
            Netdev::Hardware(h) => h.update_credits(ring_id, max_msn, reset),
            Netdev::Paravirt(p) => p.update_credits(ring_id, max_msn, reset).await,
        }
    }

    /// Number of custom rings the underlying hardware exposes (spec §4.9
    /// `NUM_RINGS`, forwarded unchanged for a paravirt guest).
    pub async fn num_rings(&mut self) -> Result<u32> {
        match self {
            Netdev::Hardware(h) => h.num_rings(),
            Netdev::Paravirt(p) => p.num_rings().await,
        }
    }

    /// Disable the global switch and drop every ikernel (spec §7 shutdown
    /// sequence). Errors are logged, not propagated: shutdown must proceed.
    pub async fn shutdown(&mut self) {
        let ids: Vec<u32> = self.common().ikernels.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.ik_destroy(id).await {
                tracing::warn!(ikernel_id = id, error = %e, "error tearing down ikernel during shutdown");
            }
        }
        if let Netdev::Hardware(h) = self {
            if let Err(e) = h.disable() {
                tracing::warn!(error = %e, "error disabling global switch during shutdown");
            }
        }
    }
}
