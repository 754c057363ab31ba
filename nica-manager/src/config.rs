//! Command-line surface (spec §6), in the derive style `zerovisor-sdk`'s
//! CLI binaries use.

use clap::Parser;

const DEFAULT_MST_GLOB: &str = "/dev/mst/*_rdma";
const DEFAULT_HV_CHANNEL_GLOB: &str = "/var/lib/libvirt/qemu/channel/target/*/nica";
const DEFAULT_SOCKET_PATH: &str = "/var/run/nica-manager.socket";

#[derive(Parser, Debug)]
#[command(name = "nica-manager", about = "NICA control-plane daemon")]
pub struct Config {
    /// MST character device to use for direct hardware access (spec §6).
    /// When omitted, the manager globs for one and falls back to the
    /// paravirt backend if none is found.
    #[arg(short = 'd', long = "device")]
    pub mst_device: Option<String>,

    /// Network interface this manager arbitrates access to.
    #[arg(short = 'i', long = "interface", default_value = "eth0")]
    pub ifname: String,

    /// Virtio-serial character device to use when running as a paravirt
    /// guest manager (spec §6). Only consulted if `mst_device` resolves to
    /// nothing.
    #[arg(short = 'v', long = "virtio-device")]
    pub virtio_device: Option<String>,

    /// Local socket tenants connect to (spec §4.8).
    #[arg(long = "socket", default_value = DEFAULT_SOCKET_PATH)]
    pub socket_path: String,

    /// `tracing-subscriber` env-filter directive, ambient (not in spec.md).
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn mst_glob() -> &'static str {
        DEFAULT_MST_GLOB
    }

    pub fn hypervisor_channel_glob() -> &'static str {
        DEFAULT_HV_CHANNEL_GLOB
    }
}
