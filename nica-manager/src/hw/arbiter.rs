//! DRR packet scheduler arbiter (spec §4.3). Ported from `Arbiter` in
//! `original_source/manager/nica.py`.

use crate::error::Result;
use crate::hw::axi::AxiLite;
use crate::hw::gateway::Gateway;

const SCHEDULER: u32 = 0x10;
const SCHEDULER_STRIDE: u32 = 0x2;
const DRR_QUANTUM: u32 = 0;

pub struct Arbiter<'a> {
    gateway: Gateway<'a>,
}

impl<'a> Arbiter<'a> {
    pub fn new(axi: &'a mut dyn AxiLite, base: u32) -> Self {
        Arbiter {
            gateway: Gateway::new(axi, base),
        }
    }

    fn quantum_address(tc: u32) -> u32 {
        SCHEDULER + tc * SCHEDULER_STRIDE + DRR_QUANTUM
    }

    /// Rate share for `tc` is `quantum[tc] / sum(quantum[*])`.
    pub fn set_quantum(&mut self, tc: u32, quantum: u32) -> Result<()> {
        self.gateway.write(Self::quantum_address(tc), quantum, None)
    }

    pub fn get_quantum(&mut self, tc: u32) -> Result<u32> {
        self.gateway.read(Self::quantum_address(tc), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::testutil::HandshakingAxi;

    #[test]
    fn quantum_round_trips_for_all_traffic_classes() {
        let mut axi = HandshakingAxi::new();
        for tc in 0..4u32 {
            axi.seed_data_out(0x0, 7 * (tc + 1));
            let mut arbiter = Arbiter::new(&mut axi, 0x0);
            arbiter.set_quantum(tc, 7 * (tc + 1)).unwrap();
            assert_eq!(arbiter.get_quantum(tc).unwrap(), 7 * (tc + 1));
        }
    }
}
