//! Bus target that acts as the master of a downstream TAP.
//!
//! Software on the bus side drives every TCK of the downstream port itself: one at a time
//! through STEP, free-running through CLOCK_ENABLE, or as a stream of bit-bang command bytes
//! written to DATA1..DATA4.  The port has its own clock, unrelated to the bus clock: level
//! controls reach it through synchronizers and steps through a toggle handshake, and the TDO
//! sampled by a step comes back with the acknowledge.
//!
//! # Command bytes
//!
//! A write to DATA*n* queues the low *n* bytes of the word, byte 0 first.  With MODE clear they
//! are OpenOCD remote-bitbang commands: `'0'..='7'` drive TCK (bit 2), TMS (bit 1) and TDI
//! (bit 0), a TCK that goes from low to high clocking the port once, and `'R'` shifts the port's
//! latched TDO into the TDO register.  Any other byte is skipped.  With MODE set every byte holds
//! two commands, low nybble first: `0..=7` as the levels above and `8` for `'R'`.  A DATA or STEP
//! write arriving while commands are still queued is held with not-ready.
//!
//! # Registers
//!
//! | Offset | Name         | Access | Content                                            |
//! |--------|--------------|--------|----------------------------------------------------|
//! | 0x00   | STATUS       | RO     | done, latched TDO, bits valid, enable, mode, lines |
//! | 0x04   | CLOCK_ENABLE | RW     | bit 0: free-running TCK                            |
//! | 0x08   | OUTPUT       | RW     | bit 0 TMS, bit 1 TDI                               |
//! | 0x0c   | OUTPUT_SET   | WO     | set OUTPUT bits written as 1                       |
//! | 0x10   | OUTPUT_CLEAR | WO     | clear OUTPUT bits written as 1                     |
//! | 0x14   | STEP         | WO     | bit 0 TMS, bit 1 TDI, then exactly one TCK         |
//! | 0x18   | TDO          | RO     | TDO bits from steps, shifted in at bit 31          |
//! | 0x1c   | TDO_CLEAR    | RO     | as TDO, and empties it                             |
//! | 0x20   | DATA1        | WO     | one command byte                                   |
//! | 0x24   | DATA2        | WO     | two command bytes                                  |
//! | 0x28   | DATA3        | WO     | three command bytes                                |
//! | 0x2c   | DATA4        | WO     | four command bytes                                 |
//! | 0x30   | MODE         | RW     | bit 0: command bytes carry two nybble commands     |
use tracing::trace;

use crate::apb::{ApbRequest, ApbResponse, ApbTarget};
use crate::cdc::{HandshakeSink, HandshakeSource, Synchronizer, SYNC_STAGES};

use regs::{Lines, Status};

/// Size of the address window the target decodes
pub const WINDOW: u32 = 0x100;

/// Port clocks between a CLOCK_ENABLE write and the enable appearing on the port
pub const CLOCK_ENABLE_LATENCY: u32 = SYNC_STAGES as u32;

pub mod regs {
    use bitfield::bitfield;

    pub const STATUS: u32 = 0x00;
    pub const CLOCK_ENABLE: u32 = 0x04;
    pub const OUTPUT: u32 = 0x08;
    pub const OUTPUT_SET: u32 = 0x0c;
    pub const OUTPUT_CLEAR: u32 = 0x10;
    pub const STEP: u32 = 0x14;
    pub const TDO: u32 = 0x18;
    pub const TDO_CLEAR: u32 = 0x1c;
    pub const DATA1: u32 = 0x20;
    pub const DATA2: u32 = 0x24;
    pub const DATA3: u32 = 0x28;
    pub const DATA4: u32 = 0x2c;
    pub const MODE: u32 = 0x30;

    bitfield! {
        #[derive(Copy, Clone, Default, Eq, PartialEq)]
        pub struct Status(u32);
        impl Debug;
        /// The last STEP has been clocked and its TDO collected
        pub done, set_done: 0;
        /// Latched TDO line
        pub tdo, set_tdo: 1;
        /// Number of valid bits in TDO, up to 32
        pub u8, bits_valid, set_bits_valid: 13, 8;
        pub tck_enable, set_tck_enable: 16;
        /// MODE bit 0
        pub nybble_mode, set_nybble_mode: 17;
        pub tms, set_tms: 24;
        pub tdi, set_tdi: 25;
    }

    bitfield! {
        /// Layout of OUTPUT, OUTPUT_SET, OUTPUT_CLEAR and STEP
        #[derive(Copy, Clone, Default, Eq, PartialEq)]
        pub struct Lines(u32);
        impl Debug;
        pub tms, set_tms: 0;
        pub tdi, set_tdi: 1;
    }

    impl Lines {
        pub const MASK: u32 = 0b11;

        pub fn new(tms: bool, tdi: bool) -> Self {
            let mut l = Lines(0);
            l.set_tms(tms);
            l.set_tdi(tdi);
            l
        }
    }
}

/// Downstream port state: driven lines plus the latched input
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct PortState {
    pub tck_enable: bool,
    pub tms: bool,
    pub tdi: bool,
    pub tdo: bool,
}

/// What the bus side asks of the port through the step handshake
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
enum PortOp {
    /// One TCK with these lines; `sample` keeps the TDO it produced
    Clock { lines: Lines, sample: bool },
    /// Report the latched TDO without clocking
    #[default]
    Sample,
}

impl PortOp {
    fn samples(self) -> bool {
        match self {
            PortOp::Clock { sample, .. } => sample,
            PortOp::Sample => true,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Command {
    Levels { tck: bool, lines: Lines },
    Read,
    Skip,
}

impl Command {
    fn levels(bits: u8) -> Self {
        Command::Levels {
            tck: bits & 4 != 0,
            lines: Lines::new(bits & 2 != 0, bits & 1 != 0),
        }
    }

    fn from_byte(byte: u8) -> Self {
        match byte {
            b'0'..=b'7' => Command::levels(byte - b'0'),
            b'R' => Command::Read,
            _ => Command::Skip,
        }
    }

    fn from_nybble(nybble: u8) -> Self {
        match nybble {
            0..=7 => Command::levels(nybble),
            8 => Command::Read,
            _ => Command::Skip,
        }
    }
}

/// Command bytes from one DATA write, waiting for the port
#[derive(Clone, Copy, Debug)]
struct CommandQueue {
    commands: [Command; 8],
    next: usize,
    len: usize,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self {
            commands: [Command::Skip; 8],
            next: 0,
            len: 0,
        }
    }
}

impl CommandQueue {
    fn load(&mut self, data: u32, bytes: usize, nybbles: bool) {
        *self = Self::default();
        for byte in data.to_le_bytes().into_iter().take(bytes) {
            if nybbles {
                self.push(Command::from_nybble(byte & 0xf));
                self.push(Command::from_nybble(byte >> 4));
            } else {
                self.push(Command::from_byte(byte));
            }
        }
    }

    fn push(&mut self, command: Command) {
        self.commands[self.len] = command;
        self.len += 1;
    }

    fn is_empty(&self) -> bool {
        self.next == self.len
    }

    fn pop(&mut self) -> Option<Command> {
        if self.is_empty() {
            return None;
        }
        self.next += 1;
        Some(self.commands[self.next - 1])
    }
}

#[derive(Default)]
struct BusSide {
    clock_enable: bool,
    nybble_mode: bool,
    lines: Lines,
    /// TCK level as last driven by a command byte
    tck: bool,
    queue: CommandQueue,
    step: HandshakeSource<PortOp>,
    tdo_sync: Synchronizer<bool>,
    tdo_sr: u32,
    bits_valid: u8,
}

#[derive(Default)]
struct PortSide {
    enable_sync: Synchronizer<bool>,
    lines_sync: Synchronizer<Lines>,
    step: HandshakeSink<bool>,
    stepping: bool,
    port: PortState,
}

#[derive(Default)]
pub struct ApbTargetJtag {
    bus: BusSide,
    port: PortSide,
}

impl ApbTargetJtag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Registered port outputs for the current port clock
    pub fn port(&self) -> PortState {
        self.port.port
    }

    /// The last STEP and every queued command have completed, as seen from the bus side
    pub fn done(&self) -> bool {
        !self.bus.step.busy() && self.bus.queue.is_empty()
    }

    /// One port clock rising edge.  `tdo` is the downstream TDO after the TCK edge (if any) that
    /// the current outputs produced.
    pub fn tick_port(&mut self, tdo: bool) {
        let port = &mut self.port;
        if port.port.tck_enable {
            port.port.tdo = tdo;
        }
        if port.stepping {
            port.step.acknowledge(tdo);
            port.stepping = false;
        }

        port.step.tick(self.bus.step.req());
        let enable = port.enable_sync.sample(self.bus.clock_enable);
        let lines = port.lines_sync.sample(self.bus.lines);

        let mut next = PortState {
            tck_enable: enable,
            tms: lines.tms(),
            tdi: lines.tdi(),
            tdo: port.port.tdo,
        };
        if port.step.pending() {
            match self.bus.step.payload() {
                PortOp::Clock { lines, .. } => {
                    next.tck_enable = true;
                    next.tms = lines.tms();
                    next.tdi = lines.tdi();
                    port.stepping = true;
                }
                PortOp::Sample => port.step.acknowledge(port.port.tdo),
            }
        }
        port.port = next;
    }

    /// Hand queued commands to the port, stopping at the first one that needs it
    fn feed(&mut self) {
        let bus = &mut self.bus;
        while !bus.step.busy() {
            let Some(command) = bus.queue.pop() else {
                return;
            };
            match command {
                Command::Levels { tck, lines } => {
                    bus.lines = lines;
                    if tck && !bus.tck {
                        bus.step.request(PortOp::Clock { lines, sample: false });
                    }
                    bus.tck = tck;
                }
                Command::Read => {
                    bus.step.request(PortOp::Sample);
                }
                Command::Skip => {}
            }
        }
    }

    fn status(&self) -> Status {
        let mut s = Status(0);
        s.set_done(self.done());
        s.set_tdo(self.bus.tdo_sync.output());
        s.set_bits_valid(self.bus.bits_valid);
        s.set_tck_enable(self.bus.clock_enable);
        s.set_nybble_mode(self.bus.nybble_mode);
        s.set_tms(self.bus.lines.tms());
        s.set_tdi(self.bus.lines.tdi());
        s
    }

    fn read(&mut self, offset: u32) -> ApbResponse {
        match offset {
            regs::STATUS => ApbResponse::data(self.status().0),
            regs::CLOCK_ENABLE => ApbResponse::data(self.bus.clock_enable as u32),
            regs::OUTPUT => ApbResponse::data(self.bus.lines.0),
            regs::MODE => ApbResponse::data(self.bus.nybble_mode as u32),
            regs::TDO => ApbResponse::data(self.bus.tdo_sr),
            regs::TDO_CLEAR => {
                let value = self.bus.tdo_sr;
                self.bus.tdo_sr = 0;
                self.bus.bits_valid = 0;
                ApbResponse::data(value)
            }
            _ => ApbResponse::ERROR,
        }
    }

    fn write(&mut self, offset: u32, data: u32) -> ApbResponse {
        let bits = data & Lines::MASK;
        match offset {
            regs::CLOCK_ENABLE => self.bus.clock_enable = data & 1 != 0,
            regs::OUTPUT => self.bus.lines = Lines(bits),
            regs::OUTPUT_SET => self.bus.lines = Lines(self.bus.lines.0 | bits),
            regs::OUTPUT_CLEAR => self.bus.lines = Lines(self.bus.lines.0 & !bits),
            regs::MODE => self.bus.nybble_mode = data & 1 != 0,
            regs::STEP => {
                // Held with not-ready until the previous step is done
                let op = PortOp::Clock { lines: Lines(bits), sample: true };
                if !self.bus.queue.is_empty() || !self.bus.step.request(op) {
                    return ApbResponse::WAIT;
                }
                self.bus.lines = Lines(bits);
                trace!("step tms={} tdi={}", bits & 1, bits >> 1);
            }
            regs::DATA1 | regs::DATA2 | regs::DATA3 | regs::DATA4 => {
                if !self.bus.queue.is_empty() {
                    return ApbResponse::WAIT;
                }
                let bytes = ((offset - regs::DATA1) / 4 + 1) as usize;
                self.bus.queue.load(data, bytes, self.bus.nybble_mode);
                trace!("queued {} command bytes {:#010x}", bytes, data);
            }
            _ => return ApbResponse::ERROR,
        }
        ApbResponse::OK
    }
}

impl ApbTarget for ApbTargetJtag {
    fn access(&mut self, request: &ApbRequest) -> ApbResponse {
        let response = if !request.is_access() {
            ApbResponse::OK
        } else if request.address % WINDOW % 4 != 0 {
            ApbResponse::ERROR
        } else if request.write_enable {
            self.write(request.address % WINDOW, request.write_data)
        } else {
            self.read(request.address % WINDOW)
        };

        if self.bus.step.tick(self.port.step.ack()) && self.bus.step.payload().samples() {
            let tdo = self.port.step.response();
            self.bus.tdo_sr = (self.bus.tdo_sr >> 1) | (tdo as u32) << 31;
            self.bus.bits_valid = (self.bus.bits_valid + 1).min(32);
        }
        self.feed();
        self.bus.tdo_sync.sample(self.port.port.tdo);
        response
    }
}
