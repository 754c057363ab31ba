//! RPC framing and dispatch (spec §4.7-§4.9). Ported from
//! `original_source/manager/nica_manager.py`'s `NICAManagerProtocol` and
//! `NICAManagerHypervisorProtocol`.

pub mod fdpass;
pub mod header;
pub mod hypervisor_client;
pub mod hypervisor_service;
pub mod unixsock;
pub mod wire;

pub use header::Header;
