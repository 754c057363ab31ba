//! Client side of the hypervisor RPC channel (spec §4.5, §4.9): a guest's
//! manager forwards every netdev operation across a virtio-serial character
//! device to the host's manager. Ported from `NICAManagerHypervisorClient`
//! in `original_source/manager/nica_manager.py` (the paravirt counterpart
//! of `NetdevHardware`'s direct register access).

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::error::{NicaError, Result};
use crate::rpc::header::{Header, EMPTY_BODY_LEN, HEADER_LEN};
use crate::rpc::wire::{self, HypervisorOpcode};

pub struct HypervisorClient {
    file: File,
}

impl HypervisorClient {
    pub async fn connect(path: &str) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path).await?;
        Ok(HypervisorClient { file })
    }

    async fn call(&mut self, opcode: HypervisorOpcode, body: &[u8]) -> Result<Vec<u8>> {
        let req = Header::request(opcode as u16, body.len() as u16);
        self.file.write_all(&req.encode()).await?;
        if !body.is_empty() {
            self.file.write_all(body).await?;
        }

        let mut hdr_buf = [0u8; HEADER_LEN];
        self.file.read_exact(&mut hdr_buf).await?;
        let resp = Header::decode(&hdr_buf);

        let len = resp.length.max(if resp.status != 0 { EMPTY_BODY_LEN } else { 0 });
        let mut payload = vec![0u8; len as usize];
        if len > 0 {
            self.file.read_exact(&mut payload).await?;
        }

        if resp.status != 0 {
            return Err(NicaError::from_errno(resp.status as i32));
        }
        Ok(payload)
    }

    pub async fn config_custom_ring(&mut self, mac: [u8; 6], ip: u32) -> Result<()> {
        let req = wire::ConfigCustomRingReq { mac, ip };
        self.call(HypervisorOpcode::ConfigCustomRing, &req.encode())
            .await?;
        Ok(())
    }

    pub async fn num_rings(&mut self) -> Result<u32> {
        let resp = self.call(HypervisorOpcode::NumRings, &[]).await?;
        wire::decode_num_rings(&resp)
    }

    pub async fn get_uuids(&mut self) -> Result<Vec<Uuid>> {
        let resp = self.call(HypervisorOpcode::GetUuids, &[]).await?;
        wire::decode_uuids(&resp)
    }

    pub async fn allocate_ikernel(&mut self, uuid: Uuid) -> Result<u32> {
        let resp = self
            .call(HypervisorOpcode::AllocateIkernel, &wire::encode_uuid(uuid))
            .await?;
        wire::decode_ikernel_id(&resp)
    }

    pub async fn deallocate_ikernel(&mut self, ikernel_id: u32) -> Result<()> {
        self.call(
            HypervisorOpcode::DeallocateIkernel,
            &wire::encode_ikernel_id(ikernel_id),
        )
        .await?;
        Ok(())
    }

    pub async fn attach(&mut self, ikernel_id: u32, ip: u32, port: u16) -> Result<(u32, u32)> {
        let req = wire::HvAttachReq { ikernel_id, ip, port };
        let resp = self.call(HypervisorOpcode::Attach, &req.encode()).await?;
        let resp = wire::HvAttachResp::decode(&resp)?;
        Ok((resp.h2n_id, resp.n2h_id))
    }

    pub async fn detach(&mut self, ikernel_id: u32, ip: u32, port: u16) -> Result<()> {
        let req = wire::HvAttachReq { ikernel_id, ip, port };
        self.call(HypervisorOpcode::Detach, &req.encode()).await?;
        Ok(())
    }

    pub async fn cr_create(&mut self, ikernel_id: u32, qpn: u32) -> Result<u32> {
        let mut body = vec![0u8; 8];
        body[0..4].copy_from_slice(&ikernel_id.to_le_bytes());
        body[4..8].copy_from_slice(&qpn.to_le_bytes());
        let resp = self.call(HypervisorOpcode::CrCreate, &body).await?;
        wire::decode_ring_id(&resp)
    }

    pub async fn cr_destroy(&mut self, ring_id: u32) -> Result<()> {
        self.call(HypervisorOpcode::CrDestroy, &wire::encode_ring_id(ring_id))
            .await?;
        Ok(())
    }

    pub async fn update_credits(&mut self, ring_id: u32, max_msn: u32, reset: bool) -> Result<()> {
        let mut body = vec![0u8; 9];
        body[0..4].copy_from_slice(&ring_id.to_le_bytes());
        body[4..8].copy_from_slice(&max_msn.to_le_bytes());
        body[8] = reset as u8;
        self.call(HypervisorOpcode::UpdateCredits, &body).await?;
        Ok(())
    }

    pub async fn rpc(&mut self, ikernel_id: u32, addr: u32, value: u32, write: bool) -> Result<u32> {
        let mut body = vec![0u8; 13];
        body[0..4].copy_from_slice(&ikernel_id.to_le_bytes());
        body[4..8].copy_from_slice(&addr.to_le_bytes());
        body[8..12].copy_from_slice(&value.to_le_bytes());
        body[12] = write as u8;
        let resp = self.call(HypervisorOpcode::Rpc, &body).await?;
        wire::decode_value(&resp)
    }
}
