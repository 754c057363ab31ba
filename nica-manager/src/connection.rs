//! A single tenant's connection to the client-socket service (spec §3
//! "Connection state", §4.8). Tracks which ikernels and rings this
//! connection created, so a disconnect (or an explicit `IK_DESTROY`)
//! only ever tears down resources the connection itself owns, and reads
//! one request at a time off the socket the way
//! `original_source/manager/nica_manager.py`'s `NICAManagerProtocol`
//! consumes its rolling receive buffer (realized here as sequential
//! `read_exact` calls instead of a chunked byte-buffer parser, since a
//! `tokio` connection task already blocks one request at a time).

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tokio::net::UnixStream;

use crate::netdev::Netdev;
use crate::rpc::fdpass;
use crate::rpc::header::{Header, EMPTY_BODY, EMPTY_BODY_LEN, HEADER_LEN};
use crate::rpc::unixsock;
use crate::rpc::wire::ClientOpcode;

/// Ikernels and rings this connection is responsible for releasing.
#[derive(Default)]
pub struct ConnectionState {
    pub ikernels: HashSet<u32>,
    pub ring_owners: HashMap<u32, u32>,
}

/// Service `stream` until the peer disconnects, then release everything
/// this connection still owns.
pub async fn serve(stream: UnixStream, netdev: Rc<RefCell<Netdev>>) {
    let mut state = ConnectionState::default();

    loop {
        let mut hdr_buf = [0u8; HEADER_LEN];
        if stream_read_exact(&stream, &mut hdr_buf).await.is_err() {
            break;
        }
        let req = Header::decode(&hdr_buf);
        let opcode = match ClientOpcode::try_from(req.opcode) {
            Ok(op) => op,
            Err(_) => {
                // Drain the declared body so the stream resynchronizes on
                // the next header, then report the unknown opcode.
                let mut discard = vec![0u8; req.length as usize];
                if req.length > 0 && stream_read_exact(&stream, &mut discard).await.is_err() {
                    break;
                }
                if write_response(&stream, req.opcode, libc::ENOSYS as u16, &EMPTY_BODY)
                    .await
                    .is_err()
                {
                    break;
                }
                continue;
            }
        };

        let needs_fd = matches!(opcode, ClientOpcode::IkAttach | ClientOpcode::IkDetach);

        let mut body = vec![0u8; req.length as usize];
        if req.length > 0 && stream_read_exact(&stream, &mut body).await.is_err() {
            break;
        }

        let fd = if needs_fd {
            // Ack first ("ready for fd"), then the client follows up with a
            // 1-byte datagram carrying the fd as ancillary SCM_RIGHTS data.
            if write_response(&stream, req.opcode, 0, &[]).await.is_err() {
                break;
            }
            match fdpass::recv_with_fd(&stream, 1).await {
                Ok((_, fd)) => fd,
                Err(_) => break,
            }
        } else {
            None
        };

        let outcome = unixsock::dispatch(opcode, &body, fd, &mut state, &netdev).await;
        let (status, resp_body) = match outcome {
            Ok(body) => (0u16, body),
            Err(e) => {
                tracing::warn!(opcode = req.opcode, error = %e, "client request failed");
                (e.as_errno() as u16, EMPTY_BODY.to_vec())
            }
        };
        let len = if status == 0 { resp_body.len() as u16 } else { EMPTY_BODY_LEN };
        if write_response(&stream, req.opcode, status, if len > 0 { &resp_body } else { &[] })
            .await
            .is_err()
        {
            break;
        }
    }

    tracing::info!(
        ikernels = state.ikernels.len(),
        "client connection closed, releasing its ikernels"
    );
    let mut nd = netdev.borrow_mut();
    for id in state.ikernels {
        if let Err(e) = nd.ik_destroy(id).await {
            tracing::warn!(ikernel_id = id, error = %e, "error releasing ikernel on disconnect");
        }
    }
}

async fn stream_read_exact(stream: &UnixStream, buf: &mut [u8]) -> std::io::Result<()> {
    let mut read = 0;
    while read < buf.len() {
        stream.readable().await?;
        match stream.try_read(&mut buf[read..]) {
            Ok(0) => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn write_response(stream: &UnixStream, opcode: u16, status: u16, body: &[u8]) -> std::io::Result<()> {
    let hdr = Header::response(opcode, body.len() as u16, status);
    loop {
        stream.writable().await?;
        match stream.try_write(&hdr.encode()) {
            Ok(_) => break,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
    if body.is_empty() {
        return Ok(());
    }
    let mut written = 0;
    while written < body.len() {
        stream.writable().await?;
        match stream.try_write(&body[written..]) {
            Ok(n) => written += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
