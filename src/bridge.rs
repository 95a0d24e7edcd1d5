//! Bridge from TAP data-register updates to register-bus transactions.
//!
//! The bridge owns the data registers behind the TAP.  It has one half in each clock domain: the
//! TCK half decodes the instruction, feeds the TAP its capture values and turns Update-DR of
//! BUS_ACCESS into a command; the bus half runs the bus transfer.  The halves talk only through a
//! toggle handshake, so there is never more than one transfer in flight.
//!
//! An update that arrives while a transfer is in flight is parked in a one-deep stall slot and
//! issued, in order, when the transfer completes.  If that slot is occupied too, the update is
//! refused and the sticky overrun bit is set.  Captures of BUS_ACCESS keep showing the last
//! completed result, with the busy bit set, until everything outstanding has completed.
use tracing::{debug, warn};

use crate::apb::{ApbRequest, ApbResponse};
use crate::bits::DR_WIDTH;
use crate::cdc::{HandshakeSink, HandshakeSource};
use crate::statemachine::ScanAction;
use crate::tap::{DrFeedback, Instruction, TapOutputs};

use regs::{AccessCapture, AccessCommand, ControlWord};

pub const IDCODE: u8 = Instruction::RESET.code();
pub const BUS_CONTROL: u8 = 0x10;
pub const BUS_ACCESS: u8 = 0x11;
pub const BYPASS: u8 = 0x1f;

pub const IDCODE_WIDTH: usize = 32;
pub const BUS_CONTROL_WIDTH: usize = 32;
pub const BUS_ACCESS_WIDTH: usize = DR_WIDTH;

/// Which data register an instruction selects
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DataRegister {
    Idcode,
    BusControl,
    BusAccess,
    Bypass,
}

impl DataRegister {
    /// Codes without a register of their own select bypass, all zeros and all ones included
    pub fn decode(ir: Instruction) -> Self {
        match ir.code() {
            IDCODE => DataRegister::Idcode,
            BUS_CONTROL => DataRegister::BusControl,
            BUS_ACCESS => DataRegister::BusAccess,
            _ => DataRegister::Bypass,
        }
    }

    pub fn width(self) -> usize {
        match self {
            DataRegister::Idcode => IDCODE_WIDTH,
            DataRegister::BusControl => BUS_CONTROL_WIDTH,
            DataRegister::BusAccess => BUS_ACCESS_WIDTH,
            DataRegister::Bypass => 1,
        }
    }
}

/// Operation field of a BUS_ACCESS scan
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AccessOp {
    None = 0,
    Read = 1,
    Write = 2,
    ClearStatus = 3,
}

impl From<u8> for AccessOp {
    fn from(op: u8) -> Self {
        match op & 3 {
            1 => AccessOp::Read,
            2 => AccessOp::Write,
            3 => AccessOp::ClearStatus,
            _ => AccessOp::None,
        }
    }
}

pub mod regs {
    use bitfield::bitfield;

    bitfield! {
        /// BUS_ACCESS data register as scanned in
        #[derive(Copy, Clone, Default, Eq, PartialEq)]
        pub struct AccessCommand(u64);
        impl Debug;
        /// 0 nothing, 1 read, 2 write, 3 clear sticky status
        pub u8, op, set_op: 1, 0;
        pub u32, data, set_data: 33, 2;
        /// Low half of the bus address; the high half is the BUS_CONTROL page
        pub u16, address, set_address: 49, 34;
    }

    bitfield! {
        /// BUS_ACCESS data register as captured
        #[derive(Copy, Clone, Default, Eq, PartialEq)]
        pub struct AccessCapture(u64);
        impl Debug;
        /// Any sticky status bit is set
        pub error, set_error: 0;
        /// A transfer is still outstanding, so the rest of the register is stale
        pub busy, set_busy: 1;
        pub u32, read_data, set_read_data: 33, 2;
        pub u16, address, set_address: 49, 34;
    }

    bitfield! {
        /// BUS_CONTROL data register
        #[derive(Copy, Clone, Default, Eq, PartialEq)]
        pub struct ControlWord(u32);
        impl Debug;
        pub bus_error, set_bus_error: 0;
        pub timeout, set_timeout: 1;
        pub overrun, set_overrun: 2;
        /// Captured: a transfer is outstanding
        pub busy, set_busy: 3;
        /// Updated: clear every sticky bit
        pub clear_sticky, set_clear_sticky: 3;
        pub u16, page, set_page: 31, 16;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BridgeConfig {
    /// Value captured by IDCODE; bit 0 should be set
    pub idcode: u32,
    /// Bus clocks a target may answer not-ready before the bridge gives up on the transfer
    pub timeout_cycles: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            idcode: 0xabcd_e6e3,
            timeout_cycles: 256,
        }
    }
}

/// A transfer on its way to the bus
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct BusCommand {
    pub address: u32,
    pub write: bool,
    pub data: u32,
}

/// The outcome of a transfer, on its way back
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct BusResult {
    pub address: u32,
    pub read_data: u32,
    pub error: bool,
    pub timeout: bool,
}

/// Failures remembered until a clear or a reset
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct StickyStatus {
    pub bus_error: bool,
    pub timeout: bool,
    pub overrun: bool,
}

impl StickyStatus {
    pub fn any(&self) -> bool {
        self.bus_error || self.timeout || self.overrun
    }
}

#[derive(Default)]
struct TckSide {
    request: HandshakeSource<BusCommand>,
    stalled: Option<BusCommand>,
    last: BusResult,
    sticky: StickyStatus,
    page: u16,
}

impl TckSide {
    fn busy(&self) -> bool {
        self.request.busy() || self.stalled.is_some()
    }

    fn submit(&mut self, command: BusCommand) {
        if self.request.request(command) {
            debug!("bus {} {:#x} issued", if command.write { "write" } else { "read" }, command.address);
        } else if self.stalled.is_none() {
            debug!("bus access to {:#x} stalled behind the one in flight", command.address);
            self.stalled = Some(command);
        } else {
            warn!("bus access to {:#x} refused: bridge busy", command.address);
            self.sticky.overrun = true;
        }
    }

    fn complete(&mut self, result: BusResult) {
        debug!("bus access to {:#x} complete: {:?}", result.address, result);
        if result.error {
            warn!("bus error at {:#x}", result.address);
            self.sticky.bus_error = true;
        }
        if result.timeout {
            warn!("bus timeout at {:#x}", result.address);
            self.sticky.timeout = true;
        }
        self.last = result;
        if let Some(command) = self.stalled.take() {
            self.submit(command);
        }
    }

    fn update_access(&mut self, command: AccessCommand) {
        let address = (self.page as u32) << 16 | command.address() as u32;
        match AccessOp::from(command.op()) {
            AccessOp::None => {}
            AccessOp::ClearStatus => self.sticky = StickyStatus::default(),
            AccessOp::Read => self.submit(BusCommand { address, write: false, data: 0 }),
            AccessOp::Write => self.submit(BusCommand { address, write: true, data: command.data() }),
        }
    }

    fn update_control(&mut self, control: ControlWord) {
        self.page = control.page();
        if control.clear_sticky() {
            self.sticky = StickyStatus::default();
        }
    }

    fn access_capture(&self) -> AccessCapture {
        let mut capture = AccessCapture(0);
        capture.set_error(self.sticky.any());
        capture.set_busy(self.busy());
        capture.set_read_data(self.last.read_data);
        capture.set_address(self.last.address as u16);
        capture
    }

    fn control_capture(&self) -> ControlWord {
        let mut control = ControlWord(0);
        control.set_bus_error(self.sticky.bus_error);
        control.set_timeout(self.sticky.timeout);
        control.set_overrun(self.sticky.overrun);
        control.set_busy(self.busy());
        control.set_page(self.page);
        control
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
enum BusPhase {
    #[default]
    Idle,
    Setup,
    Access {
        waited: u32,
    },
}

#[derive(Default)]
struct BusSide {
    sink: HandshakeSink<BusResult>,
    phase: BusPhase,
    command: BusCommand,
}

impl BusSide {
    fn finish(&mut self, result: BusResult) {
        self.sink.acknowledge(result);
        self.phase = BusPhase::Idle;
    }
}

pub struct JtagApbBridge {
    config: BridgeConfig,
    tck: TckSide,
    bus: BusSide,
}

impl JtagApbBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            tck: TckSide::default(),
            bus: BusSide::default(),
        }
    }

    /// Asynchronous reset of both halves.  Anything in flight or stalled is dropped along with the
    /// sticky status.
    pub fn reset(&mut self) {
        if self.tck.busy() {
            debug!("bridge reset with a transfer outstanding");
        }
        self.tck = TckSide::default();
        self.bus = BusSide::default();
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// A transfer has been handed to the bus half and not yet acknowledged
    pub fn in_flight(&self) -> bool {
        self.tck.request.busy()
    }

    /// An update is parked behind the transfer in flight
    pub fn stalled(&self) -> bool {
        self.tck.stalled.is_some()
    }

    pub fn sticky(&self) -> StickyStatus {
        self.tck.sticky
    }

    pub fn last_result(&self) -> BusResult {
        self.tck.last
    }

    pub fn page(&self) -> u16 {
        self.tck.page
    }

    /// Mask and capture value for the data register selected by the TAP's current instruction
    pub fn feedback(&self, tap: &TapOutputs) -> DrFeedback {
        let reg = DataRegister::decode(tap.ir);
        let value = match reg {
            DataRegister::Idcode => self.config.idcode as u64,
            DataRegister::BusControl => self.tck.control_capture().0 as u64,
            DataRegister::BusAccess => self.tck.access_capture().0,
            DataRegister::Bypass => 0,
        };
        DrFeedback::register(reg.width(), value)
    }

    /// One TCK rising edge.  `tap` holds the TAP outputs from before the edge.
    pub fn tick_tck(&mut self, tap: &TapOutputs) {
        if self.tck.request.tick(self.bus.sink.ack()) {
            let result = self.bus.sink.response();
            self.tck.complete(result);
        }

        if tap.action != ScanAction::Update {
            return;
        }
        match DataRegister::decode(tap.ir) {
            DataRegister::BusAccess => self.tck.update_access(AccessCommand(tap.dr_in.value())),
            DataRegister::BusControl => self.tck.update_control(ControlWord(tap.dr_in.value() as u32)),
            DataRegister::Idcode | DataRegister::Bypass => {}
        }
    }

    /// Request driven onto the bus during the current bus clock
    pub fn bus_request(&self) -> ApbRequest {
        let command = &self.bus.command;
        let setup = ApbRequest::setup(command.address, command.write, command.data);
        match self.bus.phase {
            BusPhase::Idle => ApbRequest::IDLE,
            BusPhase::Setup => setup,
            BusPhase::Access { .. } => setup.access(),
        }
    }

    /// One bus clock rising edge, with the target's response to `bus_request`
    pub fn tick_bus(&mut self, response: ApbResponse) {
        self.bus.sink.tick(self.tck.request.req());

        match self.bus.phase {
            BusPhase::Idle => {
                if self.bus.sink.pending() {
                    self.bus.command = self.tck.request.payload();
                    self.bus.phase = BusPhase::Setup;
                }
            }
            BusPhase::Setup => self.bus.phase = BusPhase::Access { waited: 0 },
            BusPhase::Access { waited } => {
                let command = self.bus.command;
                if !response.not_ready {
                    self.bus.finish(BusResult {
                        address: command.address,
                        read_data: response.read_data,
                        error: response.error,
                        timeout: false,
                    });
                } else if waited + 1 >= self.config.timeout_cycles {
                    self.bus.finish(BusResult {
                        address: command.address,
                        read_data: 0,
                        error: false,
                        timeout: true,
                    });
                } else {
                    self.bus.phase = BusPhase::Access { waited: waited + 1 };
                }
            }
        }
    }
}
