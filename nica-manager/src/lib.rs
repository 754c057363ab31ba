//! Trusted control-plane daemon arbitrating tenant/VM access to a
//! programmable SmartNIC/FPGA. Grown from `zerovisor-sdk`'s control-surface
//! conventions (Tokio, Clap, `anyhow`/`thiserror`, `tracing`).

pub mod config;
pub mod connection;
pub mod error;
pub mod flow;
pub mod hw;
pub mod idpool;
pub mod ikernel;
pub mod manager;
pub mod netdev;
pub mod netutil;
pub mod rpc;
