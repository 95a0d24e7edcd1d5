//! The sixteen-state TAP graph, and a probe-side tracker built on top of it.
//!
//! `JtagState::next` is the whole protocol: a lookup keyed by the current state and the TMS
//! level.  `JtagSM` keeps track of the state of the TAP at the far end of a `Cable` and gets to
//! any requested state by the shortest TMS sequence.
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use tracing::trace;

use crate::cable::Cable;
use crate::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Register {
    Data,
    Instruction,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

/// Phase of a data-register cycle, as seen by whatever backs the data registers
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ScanAction {
    #[default]
    Idle,
    Capture,
    Shift,
    Update,
}

use JtagState::*;

/// Next state, indexed by `[state][tms]`
const TRANSITIONS: [[JtagState; 2]; 16] = [
    [Idle, Reset],          // Reset
    [Idle, SelectDR],       // Idle
    [CaptureDR, SelectIR],  // SelectDR
    [ShiftDR, Exit1DR],     // CaptureDR
    [ShiftDR, Exit1DR],     // ShiftDR
    [PauseDR, UpdateDR],    // Exit1DR
    [PauseDR, Exit2DR],     // PauseDR
    [ShiftDR, UpdateDR],    // Exit2DR
    [Idle, SelectDR],       // UpdateDR
    [CaptureIR, Reset],     // SelectIR
    [ShiftIR, Exit1IR],     // CaptureIR
    [ShiftIR, Exit1IR],     // ShiftIR
    [PauseIR, UpdateIR],    // Exit1IR
    [PauseIR, Exit2IR],     // PauseIR
    [ShiftIR, UpdateIR],    // Exit2IR
    [Idle, SelectDR],       // UpdateIR
];

impl JtagState {
    pub const ALL: [JtagState; 16] = [
        Reset, Idle, SelectDR, CaptureDR, ShiftDR, Exit1DR, PauseDR, Exit2DR, UpdateDR,
        SelectIR, CaptureIR, ShiftIR, Exit1IR, PauseIR, Exit2IR, UpdateIR,
    ];

    /// State after one TCK rising edge with the given TMS level
    pub fn next(self, tms: bool) -> JtagState {
        TRANSITIONS[self as usize][tms as usize]
    }

    pub fn dr_action(self) -> ScanAction {
        match self {
            CaptureDR => ScanAction::Capture,
            ShiftDR => ScanAction::Shift,
            UpdateDR => ScanAction::Update,
            _ => ScanAction::Idle,
        }
    }

    pub fn is_shift(self) -> bool {
        matches!(self, ShiftDR | ShiftIR)
    }
}

/// Shortest TMS sequence leading from `from` to `to`.  Going to `Reset` always uses five TMS
/// highs so that it works from an unknown state too.
pub fn tms_path(from: JtagState, to: JtagState) -> Vec<bool> {
    if to == Reset {
        return vec![true; 5];
    }
    if from == to {
        return Vec::new();
    }

    let mut came_from: [Option<(JtagState, bool)>; 16] = [None; 16];
    let mut queue = VecDeque::from([from]);
    while let Some(state) = queue.pop_front() {
        for tms in [false, true] {
            let next = state.next(tms);
            if next == from || came_from[next as usize].is_some() {
                continue;
            }
            came_from[next as usize] = Some((state, tms));
            if next == to {
                let mut path = Vec::new();
                let mut at = to;
                while let Some((prev, tms)) = came_from[at as usize] {
                    path.push(tms);
                    if prev == from {
                        break;
                    }
                    at = prev;
                }
                path.reverse();
                return path;
            }
            queue.push_back(next);
        }
    }
    // Every state is reachable from every other
    unreachable!("no TMS path from {:?} to {:?}", from, to)
}

pub struct JtagSM<C> {
    pub cable: C,
    state: JtagState,
}

impl<C: Cable> JtagSM<C> {
    /// Create a JTAG state machine using an existing `Cable`.  The TAP is reset first, since its
    /// state is unknown.
    pub fn new(mut cable: C) -> Result<Self, Error> {
        cable.change_mode(&[true; 5], false)?;

        Ok(Self {
            cable,
            state: Reset,
        })
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    /// Reset the scan chain by driving TMS high for 5 clocks
    pub fn mode_reset(&mut self) -> Result<(), Error> {
        self.cable.change_mode(&[true; 5], false)?;
        self.state = Reset;
        Ok(())
    }

    /// Use TMS to get into `state` by the most efficient path
    pub fn change_mode(&mut self, state: JtagState) -> Result<(), Error> {
        if self.state == state {
            return Ok(());
        }

        let path = tms_path(self.state, state);
        trace!("path from {:?} to {:?}: {:?}", self.state, state, path);
        self.cable.change_mode(&path, false)?;
        self.state = state;
        Ok(())
    }

    /// Go to Idle and stay there for `cycles` clocks
    pub fn run_test_idle(&mut self, cycles: usize) -> Result<(), Error> {
        self.change_mode(Idle)?;
        self.cable.change_mode(&vec![false; cycles], false)
    }

    fn enter_shift(&mut self, reg: Register) -> Result<(), Error> {
        match reg {
            Register::Data => self.change_mode(ShiftDR),
            Register::Instruction => self.change_mode(ShiftIR),
        }
    }

    fn after_shift(&mut self, reg: Register, pause_after: bool) {
        if pause_after {
            self.state = match reg {
                Register::Data => PauseDR,
                Register::Instruction => PauseIR,
            };
        }
    }

    /// Read `bits` from either the instruction or data register
    pub fn read_reg(&mut self, reg: Register, bits: usize) -> Result<Vec<u8>, Error> {
        self.enter_shift(reg)?;
        self.cable.read_data(bits)
    }

    /// Write `data` into either the instruction or data register.  `bits` indicates how many bits
    /// of the last byte should be written (8 indicates that the entire byte should be written).
    /// The mode will either be ShiftIR / ShiftDR if `pause_after` is false, or PauseIR / PauseDR
    /// if `pause_after` is true.
    pub fn write_reg(&mut self, reg: Register, data: &[u8], bits: u8, pause_after: bool) -> Result<(), Error> {
        self.enter_shift(reg)?;
        self.cable.write_data(data, bits, pause_after)?;
        self.after_shift(reg, pause_after);
        Ok(())
    }

    /// Similar to `write_reg` except it returns the bits that were shifted out during writing.
    pub fn read_write_reg(&mut self, reg: Register, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, Error> {
        self.enter_shift(reg)?;
        let data = self.cable.read_write_data(data, bits, pause_after)?;
        self.after_shift(reg, pause_after);
        Ok(data)
    }
}
