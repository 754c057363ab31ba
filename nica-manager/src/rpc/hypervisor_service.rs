//! Host side of the hypervisor RPC channel (spec §4.9): services requests
//! arriving from a guest's [`crate::netdev::ParavirtNetdev`] over a
//! virtio-serial character device discovered under
//! `/var/lib/libvirt/qemu/channel/target/*/nica`. Ported from
//! `NICAManagerHypervisorProtocol` in
//! `original_source/manager/nica_manager.py`.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{NicaError, Result};
use crate::flow::Flow;
use crate::netdev::Netdev;
use crate::rpc::header::{Header, EMPTY_BODY, EMPTY_BODY_LEN, HEADER_LEN};
use crate::rpc::wire::{self, HypervisorOpcode};

/// Per-channel state: which ikernels and rings this VM owns (for
/// disconnect cleanup and to reject operations on ids it doesn't own) and
/// the MAC/IP it configured its custom ring with (the only address it is
/// permitted to attach flows for).
struct HvConnState {
    ikernels: HashSet<u32>,
    ring_owners: HashMap<u32, u32>,
    allowed_ip: Option<u32>,
}

impl HvConnState {
    fn own_ikernel(&self, id: u32) -> Result<()> {
        if self.ikernels.contains(&id) {
            Ok(())
        } else {
            Err(NicaError::NotFound)
        }
    }

    fn own_ring(&self, ring_id: u32) -> Result<()> {
        if self.ring_owners.contains_key(&ring_id) {
            Ok(())
        } else {
            Err(NicaError::NotFound)
        }
    }
}

/// Open `path`, then service requests from it until EOF, tearing down
/// every ikernel this channel ever allocated.
pub async fn serve(path: String, netdev: Rc<RefCell<Netdev>>) -> Result<()> {
    let mut file = File::options().read(true).write(true).open(&path).await?;
    let mut state = HvConnState {
        ikernels: HashSet::new(),
        ring_owners: HashMap::new(),
        allowed_ip: None,
    };

    loop {
        let mut hdr_buf = [0u8; HEADER_LEN];
        if file.read_exact(&mut hdr_buf).await.is_err() {
            break;
        }
        let req = Header::decode(&hdr_buf);
        let mut body = vec![0u8; req.length as usize];
        if req.length > 0 && file.read_exact(&mut body).await.is_err() {
            break;
        }

        let outcome = dispatch(req.opcode, &body, &mut state, &netdev).await;
        let (status, resp_body) = match outcome {
            Ok(body) => (0u16, body),
            Err(e) => {
                tracing::warn!(opcode = req.opcode, path = %path, error = %e, "hypervisor request failed");
                (e.as_errno() as u16, EMPTY_BODY.to_vec())
            }
        };
        let len = if status == 0 {
            resp_body.len() as u16
        } else {
            EMPTY_BODY_LEN
        };
        let resp_hdr = Header::response(req.opcode, len, status);
        if file.write_all(&resp_hdr.encode()).await.is_err() {
            break;
        }
        if len > 0 && file.write_all(&resp_body).await.is_err() {
            break;
        }
    }

    tracing::info!(path = %path, "hypervisor channel closed, releasing its ikernels");
    let mut nd = netdev.borrow_mut();
    for id in state.ikernels {
        if let Err(e) = nd.ik_destroy(id).await {
            tracing::warn!(ikernel_id = id, error = %e, "error releasing ikernel on channel close");
        }
    }
    Ok(())
}

async fn dispatch(
    opcode: u16,
    body: &[u8],
    state: &mut HvConnState,
    netdev: &Rc<RefCell<Netdev>>,
) -> Result<Vec<u8>> {
    let opcode = HypervisorOpcode::try_from(opcode)?;
    match opcode {
        HypervisorOpcode::ConfigCustomRing => {
            let req = wire::ConfigCustomRingReq::decode(body)?;
            state.allowed_ip = Some(req.ip);
            Ok(Vec::new())
        }
        HypervisorOpcode::NumRings => {
            let n = netdev.borrow_mut().num_rings().await?;
            Ok(wire::encode_num_rings(n))
        }
        HypervisorOpcode::GetUuids => {
            let uuids = netdev.borrow().common().clone_uuids();
            Ok(wire::encode_uuids(&uuids))
        }
        HypervisorOpcode::AllocateIkernel => {
            let uuid = wire::decode_uuid(body)?;
            let id = netdev.borrow_mut().ik_create(uuid).await?;
            state.ikernels.insert(id);
            Ok(wire::encode_ikernel_id(id))
        }
        HypervisorOpcode::DeallocateIkernel => {
            let id = wire::decode_ikernel_id(body)?;
            state.own_ikernel(id)?;
            netdev.borrow_mut().ik_destroy(id).await?;
            state.ikernels.remove(&id);
            Ok(Vec::new())
        }
        HypervisorOpcode::Attach => {
            let req = wire::HvAttachReq::decode(body)?;
            state.own_ikernel(req.ikernel_id)?;
            if let Some(allowed) = state.allowed_ip {
                if req.ip != 0 && req.ip != allowed {
                    return Err(NicaError::PermissionDenied);
                }
            }
            let flow = Flow::new(req.ip, req.port);
            let flow = netdev.borrow_mut().ik_attach(req.ikernel_id, flow).await?;
            let (_, h2n_id, n2h_id) = *netdev
                .borrow()
                .common()
                .flows
                .get(&flow)
                .ok_or(NicaError::NotFound)?;
            Ok(wire::HvAttachResp { h2n_id, n2h_id }.encode())
        }
        HypervisorOpcode::Detach => {
            let req = wire::HvAttachReq::decode(body)?;
            state.own_ikernel(req.ikernel_id)?;
            let flow = Flow::new(req.ip, req.port);
            netdev.borrow_mut().ik_detach(req.ikernel_id, flow).await?;
            Ok(Vec::new())
        }
        HypervisorOpcode::CrCreate => {
            let req = wire::CrCreateReq::decode(body)?;
            state.own_ikernel(req.ikernel_id)?;
            let ring_id = netdev
                .borrow_mut()
                .cr_create(req.ikernel_id, req.qpn)
                .await?;
            state.ring_owners.insert(ring_id, req.ikernel_id);
            Ok(wire::encode_ring_id(ring_id))
        }
        HypervisorOpcode::CrDestroy => {
            let ring_id = wire::decode_ring_id(body)?;
            state.own_ring(ring_id)?;
            netdev.borrow_mut().cr_destroy(ring_id).await?;
            state.ring_owners.remove(&ring_id);
            Ok(Vec::new())
        }
        HypervisorOpcode::UpdateCredits => {
            let req = wire::CrUpdateCreditsReq::decode(body)?;
            state.own_ring(req.ring_id)?;
            netdev
                .borrow_mut()
                .cr_update_credits(req.ring_id, req.max_msn, req.reset)
                .await?;
            Ok(Vec::new())
        }
        HypervisorOpcode::Rpc => {
            let req = wire::IkRpcReq::decode(body)?;
            state.own_ikernel(req.ikernel_id)?;
            let value = netdev
                .borrow_mut()
                .ik_rpc(req.ikernel_id, req.addr, req.value, req.write)
                .await?;
            Ok(wire::encode_value(value))
        }
    }
}
