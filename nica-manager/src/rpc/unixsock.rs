//! Per-opcode handlers for the client-socket protocol (spec §4.8). Kept
//! separate from the connection read loop ([`crate::connection`]) so the
//! dispatch logic for each opcode can be exercised without a real socket.
//! Ported from the opcode handlers on `NICAManagerProtocol` in
//! `original_source/manager/nica_manager.py`.

use std::cell::RefCell;
use std::os::unix::io::OwnedFd;
use std::rc::Rc;

use crate::connection::ConnectionState;
use crate::error::{NicaError, Result};
use crate::flow::Flow;
use crate::netdev::Netdev;
use crate::rpc::fdpass;
use crate::rpc::wire::{self, ClientOpcode};

/// Handle one fully-received request. `fd` carries the descriptor passed
/// alongside `IK_ATTACH`/`IK_DETACH` via `SCM_RIGHTS`, if any.
pub async fn dispatch(
    opcode: ClientOpcode,
    body: &[u8],
    fd: Option<OwnedFd>,
    conn: &mut ConnectionState,
    netdev: &Rc<RefCell<Netdev>>,
) -> Result<Vec<u8>> {
    match opcode {
        ClientOpcode::IkCreate => {
            let req = wire::IkCreateReq::decode(body)?;
            if req.netdev_name_str() != netdev.borrow().ifname() {
                return Err(NicaError::NoDevice);
            }
            let id = netdev.borrow_mut().ik_create(req.uuid).await?;
            conn.ikernels.insert(id);
            Ok(wire::encode_ikernel_id(id))
        }
        ClientOpcode::IkDestroy => {
            let id = wire::decode_ikernel_id(body)?;
            conn.own_ikernel(id)?;
            netdev.borrow_mut().ik_destroy(id).await?;
            conn.ikernels.remove(&id);
            Ok(Vec::new())
        }
        ClientOpcode::IkAttach => {
            let ikernel_id = wire::decode_ikernel_id(body)?;
            conn.own_ikernel(ikernel_id)?;
            let fd = fd.ok_or(NicaError::Invalid)?;
            let (ip, port) = fdpass::bound_ipv4(&fd)?;
            let flow = netdev
                .borrow_mut()
                .ik_attach(ikernel_id, Flow::new(ip, port))
                .await?;
            Ok(wire::encode_flow(flow.ip, flow.port))
        }
        ClientOpcode::IkDetach => {
            let ikernel_id = wire::decode_ikernel_id(body)?;
            conn.own_ikernel(ikernel_id)?;
            let fd = fd.ok_or(NicaError::Invalid)?;
            let (ip, port) = fdpass::bound_ipv4(&fd)?;
            netdev
                .borrow_mut()
                .ik_detach(ikernel_id, Flow::new(ip, port))
                .await?;
            Ok(Vec::new())
        }
        ClientOpcode::IkRpc => {
            let req = wire::IkRpcReq::decode(body)?;
            conn.own_ikernel(req.ikernel_id)?;
            let value = netdev
                .borrow_mut()
                .ik_rpc(req.ikernel_id, req.addr, req.value, req.write)
                .await?;
            Ok(wire::encode_value(value))
        }
        ClientOpcode::CrCreate => {
            let req = wire::CrCreateReq::decode(body)?;
            conn.own_ikernel(req.ikernel_id)?;
            let ring_id = netdev
                .borrow_mut()
                .cr_create(req.ikernel_id, req.qpn)
                .await?;
            conn.ring_owners.insert(ring_id, req.ikernel_id);
            Ok(wire::encode_ring_id(ring_id))
        }
        ClientOpcode::CrDestroy => {
            let ring_id = wire::decode_ring_id(body)?;
            conn.own_ring(ring_id)?;
            netdev.borrow_mut().cr_destroy(ring_id).await?;
            conn.ring_owners.remove(&ring_id);
            Ok(Vec::new())
        }
        ClientOpcode::CrUpdateCredits => {
            let req = wire::CrUpdateCreditsReq::decode(body)?;
            conn.own_ring(req.ring_id)?;
            netdev
                .borrow_mut()
                .cr_update_credits(req.ring_id, req.max_msn, req.reset)
                .await?;
            Ok(Vec::new())
        }
    }
}

impl ConnectionState {
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
