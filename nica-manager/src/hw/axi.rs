//! AXI-Lite transport (spec §4.1): positional 32-bit register access on a
//! character device, or an in-memory shadow for simulation/testing.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;

use tracing::{trace, warn};

use crate::error::{NicaError, Result};

/// 32-bit register read/write on the AXI-Lite bus reaching the FPGA.
/// `delay` carries simulation-accounting metadata only; it has no
/// semantic meaning against real hardware (spec §4.1).
pub trait AxiLite {
    fn read32(&mut self, addr: u32, delay: Option<u32>) -> Result<u32>;
    fn write32(&mut self, addr: u32, value: u32, delay: Option<u32>) -> Result<()>;
}

const SHELL_VERSION_ADDR: u32 = 0x900000;

/// `_IOW('m', 0x80, 4)`: selects the FPGA's register access path.
fn ioctl_access_type() -> libc::c_ulong {
    const IOC_WRITE: libc::c_ulong = 1;
    const SIZE: libc::c_ulong = 4;
    (IOC_WRITE << 30) | (SIZE << 16) | (('m' as libc::c_ulong) << 8) | 0x80
}

const ACCESS_TYPE_I2C: libc::c_int = 0;
const ACCESS_TYPE_RDMA: libc::c_int = 1;

/// Real hardware access over the MST character device (spec §4.1, §6).
pub struct HardwareAxi {
    file: File,
    big_endian: bool,
    shell_version: u32,
}

impl HardwareAxi {
    pub fn open(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(0)
            .open(path)?;

        set_access_type(&file, ACCESS_TYPE_RDMA)?;

        let mut this = HardwareAxi {
            file,
            big_endian: false,
            shell_version: 0,
        };

        let raw = match this.read_word(SHELL_VERSION_ADDR) {
            Ok(v) => v,
            Err(_) => {
                warn!("AXI-Lite RDMA read failed, reverting to I2C access");
                set_access_type(&this.file, ACCESS_TYPE_I2C)?;
                this.read_word(SHELL_VERSION_ADDR)?
            }
        };

        if raw >= 0x10000 || raw == 0 {
            this.big_endian = true;
            this.shell_version = raw.swap_bytes();
        } else {
            this.shell_version = raw;
        }

        tracing::info!(shell_version = this.shell_version, "AXI-Lite transport ready");
        Ok(this)
    }

    pub fn shell_version(&self) -> u32 {
        self.shell_version
    }

    fn read_word(&self, addr: u32) -> Result<u32> {
        let mut buf = [0u8; 4];
        let n = unsafe {
            libc::pread(
                self.file.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                4,
                addr as libc::off_t,
            )
        };
        if n != 4 {
            return Err(NicaError::Io(std::io::Error::last_os_error()));
        }
        Ok(u32::from_le_bytes(buf))
    }

    fn write_word(&self, addr: u32, value: u32) -> Result<()> {
        let buf = value.to_le_bytes();
        let n = unsafe {
            libc::pwrite(
                self.file.as_raw_fd(),
                buf.as_ptr() as *const libc::c_void,
                4,
                addr as libc::off_t,
            )
        };
        if n != 4 {
            return Err(NicaError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

fn set_access_type(file: &File, access_type: libc::c_int) -> Result<()> {
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), ioctl_access_type(), access_type) };
    if ret != 0 {
        return Err(NicaError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

impl AxiLite for HardwareAxi {
    fn read32(&mut self, addr: u32, _delay: Option<u32>) -> Result<u32> {
        let raw = self.read_word(addr)?;
        Ok(if self.big_endian { raw.swap_bytes() } else { raw })
    }

    fn write32(&mut self, addr: u32, value: u32, _delay: Option<u32>) -> Result<()> {
        let raw = if self.big_endian { value.swap_bytes() } else { value };
        self.write_word(addr, raw)
    }
}

/// In-memory shadow transport for tests and the simulation-input generator
/// role `original_source/manager/nica.py::NicaSimulation` plays.
#[derive(Default)]
pub struct SimAxi {
    shadow: HashMap<u32, u32>,
}

impl SimAxi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AxiLite for SimAxi {
    fn read32(&mut self, addr: u32, delay: Option<u32>) -> Result<u32> {
        let value = *self.shadow.get(&addr).unwrap_or(&0);
        trace!("{}: 1 {:x} [{:x}]", delay.unwrap_or(0), addr, value);
        Ok(value)
    }

    fn write32(&mut self, addr: u32, value: u32, delay: Option<u32>) -> Result<()> {
        trace!("{}: 0 {:x} {:x}", delay.unwrap_or(0), addr, value);
        self.shadow.insert(addr, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_axi_round_trips() {
        let mut axi = SimAxi::new();
        axi.write32(0x100, 0xdead_beef, None).unwrap();
        assert_eq!(axi.read32(0x100, None).unwrap(), 0xdead_beef);
    }

    #[test]
    fn sim_axi_unwritten_address_reads_zero() {
        let mut axi = SimAxi::new();
        assert_eq!(axi.read32(0x999, None).unwrap(), 0);
    }
}
