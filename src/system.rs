//! Harnesses that wire the blocks together, with every clock domain advanced explicitly.
//!
//! `JtagApbSystem` is a TAP with the bridge behind it and a bus target on the far side.  TCK and
//! the bus clock are separate tick sources; `clock` is a convenience that runs a fixed number of
//! bus clocks per TCK.
//!
//! `LoopbackSystem` puts an `ApbTargetJtag` in front of a `JtagApbSystem`, so bus software can
//! bit-bang its way through the downstream TAP and bridge to the downstream bus.
use tracing::trace;

use crate::apb::{transfer, ApbBus, ApbRequest, ApbResponse, ApbTarget};
use crate::bridge::{BridgeConfig, JtagApbBridge};
use crate::error::Error;
use crate::tap::{JtagPins, TapController};
use crate::target::ApbTargetJtag;

#[derive(Clone, Copy, Debug)]
pub struct SystemConfig {
    pub bridge: BridgeConfig,
    /// Bus clocks run by `JtagApbSystem::clock` after each TCK
    pub bus_ticks_per_tck: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            bus_ticks_per_tck: 3,
        }
    }
}

pub struct JtagApbSystem<T> {
    pub tap: TapController,
    pub bridge: JtagApbBridge,
    pub target: T,
    config: SystemConfig,
}

impl<T: ApbTarget> JtagApbSystem<T> {
    pub fn new(target: T, config: SystemConfig) -> Self {
        Self {
            tap: TapController::new(),
            bridge: JtagApbBridge::new(config.bridge),
            target,
            config,
        }
    }

    /// System reset: asynchronous, hits the TAP and both halves of the bridge
    pub fn reset(&mut self) {
        self.tap.reset();
        self.bridge.reset();
    }

    /// One TCK rising edge; returns TDO after the edge.  TRST low overrides the edge and resets
    /// the bridge along with the TAP, so an Update-DR on the same clock is never acted on.
    pub fn tick_tck(&mut self, pins: JtagPins) -> bool {
        if !pins.ntrst {
            self.reset();
            return self.tap.tdo();
        }
        let outputs = self.tap.outputs();
        let feedback = self.bridge.feedback(&outputs);
        self.bridge.tick_tck(&outputs);
        self.tap.tick(pins, feedback);
        self.tap.tdo()
    }

    /// One bus clock rising edge
    pub fn tick_bus(&mut self) {
        let request = self.bridge.bus_request();
        let response = self.target.access(&request);
        self.bridge.tick_bus(response);
    }

    /// One TCK followed by `bus_ticks_per_tck` bus clocks
    pub fn clock(&mut self, pins: JtagPins) -> bool {
        let tdo = self.tick_tck(pins);
        for _ in 0..self.config.bus_ticks_per_tck {
            self.tick_bus();
        }
        tdo
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LoopbackConfig {
    pub downstream: SystemConfig,
    /// Bus clocks per port clock
    pub port_divider: u32,
    /// Not-ready clocks a software access waits before giving up
    pub max_wait_cycles: u32,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            downstream: SystemConfig::default(),
            port_divider: 2,
            max_wait_cycles: 1024,
        }
    }
}

pub struct LoopbackSystem<T> {
    pub master: ApbTargetJtag,
    pub downstream: JtagApbSystem<T>,
    config: LoopbackConfig,
    bus_cycles: u64,
}

impl<T: ApbTarget> LoopbackSystem<T> {
    pub fn new(target: T, config: LoopbackConfig) -> Self {
        Self {
            master: ApbTargetJtag::new(),
            downstream: JtagApbSystem::new(target, config.downstream),
            config,
            bus_cycles: 0,
        }
    }

    pub fn reset(&mut self) {
        self.master.reset();
        self.downstream.reset();
    }

    pub fn bus_cycles(&self) -> u64 {
        self.bus_cycles
    }

    /// One port clock: the downstream TAP sees TCK only when the master enables it, while the
    /// downstream bus clock free-runs
    pub fn tick_port(&mut self) {
        let port = self.master.port();
        if port.tck_enable {
            trace!("downstream tck tms={} tdi={}", port.tms, port.tdi);
            self.downstream.tick_tck(JtagPins::new(port.tms, port.tdi));
        }
        self.downstream.tick_bus();
        self.master.tick_port(self.downstream.tap.tdo());
    }
}

impl<T: ApbTarget> ApbTarget for LoopbackSystem<T> {
    fn access(&mut self, request: &ApbRequest) -> ApbResponse {
        let response = self.master.access(request);
        self.bus_cycles += 1;
        if self.bus_cycles % self.config.port_divider.max(1) as u64 == 0 {
            self.tick_port();
        }
        response
    }
}

impl<T: ApbTarget> ApbBus for LoopbackSystem<T> {
    fn read(&mut self, address: u32) -> Result<u32, Error> {
        let max = self.config.max_wait_cycles;
        transfer(self, address, None, max, |_| {})
    }

    fn write(&mut self, address: u32, data: u32) -> Result<(), Error> {
        let max = self.config.max_wait_cycles;
        transfer(self, address, Some(data), max, |_| {}).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apb::ApbMemory;
    use crate::statemachine::JtagState;
    use crate::target::regs;

    #[test]
    fn reset_hits_both_blocks() {
        let mut sys = JtagApbSystem::new(ApbMemory::new(4), SystemConfig::default());
        for tms in [false, true, false, false] {
            sys.clock(JtagPins::new(tms, false));
        }
        assert_eq!(sys.tap.state(), JtagState::ShiftDR);
        sys.reset();
        assert_eq!(sys.tap.state(), JtagState::Reset);
        assert!(!sys.bridge.in_flight());
    }

    #[test]
    fn loopback_status_read() {
        let mut sys = LoopbackSystem::new(ApbMemory::new(4), LoopbackConfig::default());
        let status = sys.read(regs::STATUS).unwrap();
        assert_eq!(status & 1, 1);
        assert_eq!(sys.read(0x40), Err(Error::Bus { address: 0x40 }));
        assert!(sys.bus_cycles() >= 4);
    }
}
