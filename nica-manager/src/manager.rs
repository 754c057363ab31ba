//! The daemon's event loop (spec §5, §6): binds the tenant-facing socket,
//! connects out to every discovered hypervisor channel, and runs both
//! until `SIGINT`. Ported from `main()` in
//! `original_source/manager/nica_manager.py`, realized as a `tokio`
//! current-thread runtime with a `LocalSet` rather than an `asyncio`
//! event loop, so every connection task can share one
//! `Rc<RefCell<Netdev>>` without locking (spec §5: "single-threaded
//! cooperative scheduling").

use std::cell::RefCell;
use std::os::unix::fs::PermissionsExt;
use std::rc::Rc;

use anyhow::{Context, Result};
use tokio::net::UnixListener;
use tokio::task::LocalSet;

use crate::config::Config;
use crate::connection;
use crate::netdev::{ifaddr, HardwareNetdev, Netdev, ParavirtNetdev};
use crate::netutil::mac_to_str;
use crate::rpc::hypervisor_service;

const DEFAULT_GUEST_CHARDEV: &str = "/dev/virtio-ports/nica";

/// Resolve which backend to run: the first MST device the glob finds, or
/// the paravirt guest channel if none exists (spec §4.4 `init_nica`).
async fn open_netdev(config: &Config) -> Result<Netdev> {
    let mst_path = config
        .mst_device
        .clone()
        .or_else(|| glob::glob(Config::mst_glob()).ok()?.filter_map(|p| p.ok()).next().map(|p| p.to_string_lossy().into_owned()));

    if let Some(path) = mst_path {
        tracing::info!(device = %path, "opening hardware netdev");
        let mut netdev = HardwareNetdev::new(&config.ifname, &path)
            .with_context(|| format!("opening MST device {path}"))?;
        netdev.initialize().context("initializing hardware netdev")?;
        return Ok(Netdev::Hardware(netdev));
    }

    let chardev = config
        .virtio_device
        .clone()
        .unwrap_or_else(|| DEFAULT_GUEST_CHARDEV.to_string());
    tracing::info!(device = %chardev, "no MST device found, opening paravirt netdev");
    let ip = ifaddr::ipv4_address(&config.ifname).context("resolving interface IPv4 address")?;
    let mut netdev = ParavirtNetdev::new(&config.ifname, ip, &chardev)
        .await
        .with_context(|| format!("opening virtio channel {chardev}"))?;
    let mac = ifaddr::mac_address(&config.ifname).context("resolving interface MAC")?;
    netdev
        .initialize(&mac_to_str(mac))
        .await
        .context("initializing paravirt netdev")?;
    Ok(Netdev::Paravirt(netdev))
}

pub async fn run(config: Config) -> Result<()> {
    let netdev = Rc::new(RefCell::new(open_netdev(&config).await?));

    let _ = std::fs::remove_file(&config.socket_path);
    let listener = UnixListener::bind(&config.socket_path)
        .with_context(|| format!("binding {}", config.socket_path))?;
    std::fs::set_permissions(&config.socket_path, std::fs::Permissions::from_mode(0o777))
        .context("setting socket permissions")?;
    tracing::info!(path = %config.socket_path, "listening for tenant connections");

    let local = LocalSet::new();

    for entry in glob::glob(Config::hypervisor_channel_glob())
        .context("globbing hypervisor channel directory")?
        .filter_map(|p| p.ok())
    {
        let path = entry.to_string_lossy().into_owned();
        let netdev = netdev.clone();
        local.spawn_local(async move {
            if let Err(e) = hypervisor_service::serve(path.clone(), netdev).await {
                tracing::warn!(path = %path, error = %e, "hypervisor channel handler exited");
            }
        });
    }

    local
        .run_until(async {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _addr)) => {
                                let netdev = netdev.clone();
                                tokio::task::spawn_local(connection::serve(stream, netdev));
                            }
                            Err(e) => tracing::warn!(error = %e, "accept failed"),
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("received SIGINT, shutting down");
                        break;
                    }
                }
            }
        })
        .await;

    netdev.borrow_mut().shutdown().await;
    let _ = std::fs::remove_file(&config.socket_path);
    Ok(())
}
