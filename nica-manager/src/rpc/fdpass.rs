//! `SCM_RIGHTS` file-descriptor passing over the client UNIX domain socket
//! (spec §4.8 `IK_ATTACH`): a tenant hands the manager a socket it has
//! already bound to the flow's local port, and the manager reads back the
//! bound address with `getsockname` instead of trusting a self-declared
//! `(ip, port)`. Ported from the `recv_fds` helper in
//! `original_source/manager/nica_manager.py`.

use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use tokio::net::UnixStream;

use crate::error::{NicaError, Result};

const CMSG_BUF_LEN: usize = 64;

/// Read one message from `stream`'s control channel, returning its data
/// payload and, if present, exactly one passed file descriptor. Retries on
/// `EWOULDBLOCK`/`EAGAIN` the way a non-blocking `recvmsg` caller must.
pub async fn recv_with_fd(stream: &UnixStream, max_len: usize) -> Result<(Vec<u8>, Option<OwnedFd>)> {
    loop {
        stream.readable().await?;
        match try_recv_with_fd(stream, max_len) {
            Ok(result) => return Ok(result),
            Err(NicaError::Io(e)) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
}

fn try_recv_with_fd(stream: &UnixStream, max_len: usize) -> Result<(Vec<u8>, Option<OwnedFd>)> {
    let fd = stream.as_raw_fd();
    let mut data = vec![0u8; max_len];
    let mut cmsg_buf = [0u8; CMSG_BUF_LEN];

    let mut iov = libc::iovec {
        iov_base: data.as_mut_ptr() as *mut libc::c_void,
        iov_len: data.len(),
    };

    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = cmsg_buf.len() as _;

    let n = unsafe { libc::recvmsg(fd, &mut msg, 0) };
    if n < 0 {
        return Err(NicaError::Io(std::io::Error::last_os_error()));
    }
    data.truncate(n as usize);

    let mut passed_fd: Option<RawFd> = None;
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            let hdr = &*cmsg;
            if hdr.cmsg_level == libc::SOL_SOCKET && hdr.cmsg_type == libc::SCM_RIGHTS {
                let data_ptr = libc::CMSG_DATA(cmsg) as *const RawFd;
                passed_fd = Some(*data_ptr);
                break;
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }

    let owned = passed_fd.map(|fd| unsafe { OwnedFd::from_raw_fd(fd) });
    Ok((data, owned))
}

/// `getsockname` on a passed socket fd, returning its bound `(ip, port)` in
/// host byte order. Fails with [`NicaError::Invalid`] if the fd is not an
/// `AF_INET` socket.
pub fn bound_ipv4(fd: &OwnedFd) -> Result<(u32, u16)> {
    let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockname(
            fd.as_raw_fd(),
            &mut addr as *mut _ as *mut libc::sockaddr,
            &mut len,
        )
    };
    if ret != 0 {
        return Err(NicaError::Io(std::io::Error::last_os_error()));
    }
    if addr.sin_family as i32 != libc::AF_INET {
        return Err(NicaError::Invalid);
    }
    Ok((addr.sin_addr.s_addr.to_be(), addr.sin_port.to_be()))
}
