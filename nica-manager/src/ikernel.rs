//! Per-tenant logical ikernel handle (spec §3, §4.6).
//!
//! Holds no back-reference to its owning [`crate::netdev::Netdev`] — per
//! the REDESIGN FLAGS disposition in SPEC_FULL.md §8, ownership is modeled
//! by indices: `Netdev` indexes `Ikernel`s by `id` in a map, and callers
//! (connections, the hypervisor-side service) track only the ids they are
//! responsible for releasing.

use std::collections::HashSet;

use crate::flow::Flow;

#[derive(Debug, Clone)]
pub struct Ikernel {
    /// Hardware ikernel *type*, resolved from the requested UUID.
    pub index: u32,
    /// Allocated instance handle from the netdev's ikernel id pool.
    pub id: u32,
    pub flows: HashSet<Flow>,
    pub rings: HashSet<u32>,
}

impl Ikernel {
    pub fn new(index: u32, id: u32) -> Self {
        Ikernel {
            index,
            id,
            flows: HashSet::new(),
            rings: HashSet::new(),
        }
    }
}
