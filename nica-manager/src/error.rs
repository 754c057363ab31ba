//! Error taxonomy and its mapping onto the POSIX errno values carried in
//! the RPC response `status` field (spec §4.7, §7).

use thiserror::Error;

/// Every failure mode a service method or driver can report. Each variant
/// maps to exactly one errno via [`NicaError::as_errno`]; the RPC dispatcher
/// never sees anything else.
#[derive(Debug, Error)]
pub enum NicaError {
    #[error("unknown ikernel, ring, flow or UUID")]
    NotFound,
    #[error("malformed RPC or hardware-reported flow-table failure")]
    Invalid,
    #[error("netdev not managed by this manager")]
    NoDevice,
    #[error("flow already attached")]
    AddrInUse,
    #[error("id pool exhausted")]
    NoSpace,
    #[error("operation not permitted for this VM")]
    PermissionDenied,
    #[error("unknown RPC opcode")]
    NoSys,
    #[error("transport closed mid-message")]
    Pipe,
    #[error("gateway handshake exceeded its deadline")]
    GatewayTimeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NicaError {
    /// The positive errno value carried on the wire (spec §4.7/§7).
    pub fn as_errno(&self) -> i32 {
        match self {
            NicaError::PermissionDenied => libc::EPERM,
            NicaError::NotFound => libc::ENOENT,
            NicaError::Invalid => libc::EINVAL,
            NicaError::NoDevice => libc::ENODEV,
            NicaError::AddrInUse => libc::EADDRINUSE,
            NicaError::NoSpace => libc::ENOSPC,
            NicaError::NoSys => libc::ENOSYS,
            NicaError::Pipe => libc::EPIPE,
            NicaError::GatewayTimeout => libc::ETIMEDOUT,
            NicaError::Io(e) => e.raw_os_error().unwrap_or(libc::EINVAL),
        }
    }

    /// Reconstruct an error from a wire errno (used by the paravirt client
    /// path, which receives a `status` field and must raise the matching
    /// error to its own caller).
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            libc::EPERM => NicaError::PermissionDenied,
            libc::ENOENT => NicaError::NotFound,
            libc::EINVAL => NicaError::Invalid,
            libc::ENODEV => NicaError::NoDevice,
            libc::EADDRINUSE => NicaError::AddrInUse,
            libc::ENOSPC => NicaError::NoSpace,
            libc::ENOSYS => NicaError::NoSys,
            libc::EPIPE => NicaError::Pipe,
            libc::ETIMEDOUT => NicaError::GatewayTimeout,
            other => NicaError::Io(std::io::Error::from_raw_os_error(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, NicaError>;
