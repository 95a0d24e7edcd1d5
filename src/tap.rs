//! Target-side TAP controller: the state machine, the instruction register, and a generic masked
//! data-register shift path.
//!
//! The controller does not own any data register.  Whoever decodes the instruction supplies a
//! `DrFeedback` each clock: `held` is the value captured in Capture-DR and kept in every masked-out
//! position, and `mask` picks the positions that form the shift chain.  Scanned bits enter at
//! the highest masked-in position and leave from the lowest.
use tracing::{debug, trace};

use crate::bits::{DrBits, DR_WIDTH};
use crate::statemachine::{JtagState, ScanAction};

pub const IR_WIDTH: usize = 5;

/// Value loaded into the IR shift register in Capture-IR
pub const IR_CAPTURE: u8 = 0b00001;

/// A 5-bit instruction code
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash)]
pub struct Instruction(u8);

impl Instruction {
    /// Value the instruction register takes on any reset.  It selects IDCODE, so an identification
    /// read needs no IR scan after Test-Logic-Reset.
    pub const RESET: Instruction = Instruction(0b00001);

    pub const fn new(code: u8) -> Self {
        Self(code & ((1 << IR_WIDTH) - 1))
    }

    pub const fn code(self) -> u8 {
        self.0
    }
}

/// Levels on the probe-facing pins for one TCK cycle.  `ntrst` is active low.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct JtagPins {
    pub ntrst: bool,
    pub tms: bool,
    pub tdi: bool,
}

impl JtagPins {
    pub const fn new(tms: bool, tdi: bool) -> Self {
        Self { ntrst: true, tms, tdi }
    }
}

/// What the data-register owner feeds back into the shift path
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct DrFeedback {
    pub mask: DrBits,
    pub held: DrBits,
}

impl DrFeedback {
    /// A contiguous register of `width` bits capturing `value`
    pub fn register(width: usize, value: u64) -> Self {
        let mask = DrBits::low(width);
        Self {
            mask,
            held: DrBits::new(value) & mask,
        }
    }
}

/// Registered outputs, as seen by the data-register owner during the current cycle
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TapOutputs {
    pub tdo: bool,
    pub ir: Instruction,
    pub action: ScanAction,
    pub dr_in: DrBits,
}

/// Shift `dr` one place towards bit 0 along the positions set in `feedback.mask`, with `tdi`
/// entering at the top.  Masked-out positions take `feedback.held`.  Returns the new register
/// and the bit that fell out of the bottom; with an empty mask that is `tdi` itself.
pub fn shift_masked(dr: DrBits, feedback: DrFeedback, tdi: bool) -> (DrBits, bool) {
    let mut next = feedback.held & !feedback.mask;
    let mut carry = tdi;
    for i in (0..DR_WIDTH).rev() {
        if feedback.mask.bit(i) {
            next.set_bit(i, carry);
            carry = dr.bit(i);
        }
    }
    (next, carry)
}

pub struct TapController {
    state: JtagState,
    ir_shift: u8,
    ir: Instruction,
    dr: DrBits,
    tdo: bool,
}

impl Default for TapController {
    fn default() -> Self {
        Self::new()
    }
}

impl TapController {
    pub fn new() -> Self {
        Self {
            state: JtagState::Reset,
            ir_shift: 0,
            ir: Instruction::RESET,
            dr: DrBits::ZERO,
            tdo: false,
        }
    }

    /// Asynchronous reset: takes effect immediately, discarding any scan in progress
    pub fn reset(&mut self) {
        if self.state != JtagState::Reset {
            debug!("tap reset from {:?}", self.state);
        }
        *self = Self::new();
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    /// The latched instruction
    pub fn instruction(&self) -> Instruction {
        self.ir
    }

    pub fn action(&self) -> ScanAction {
        self.state.dr_action()
    }

    /// The visible data-in image
    pub fn dr_in(&self) -> DrBits {
        self.dr
    }

    pub fn tdo(&self) -> bool {
        self.tdo
    }

    pub fn outputs(&self) -> TapOutputs {
        TapOutputs {
            tdo: self.tdo,
            ir: self.ir,
            action: self.action(),
            dr_in: self.dr,
        }
    }

    /// One rising edge of TCK
    pub fn tick(&mut self, pins: JtagPins, feedback: DrFeedback) {
        if !pins.ntrst {
            self.reset();
            return;
        }

        self.tdo = false;
        match self.state {
            JtagState::CaptureIR => self.ir_shift = IR_CAPTURE,
            JtagState::ShiftIR => {
                self.tdo = self.ir_shift & 1 != 0;
                self.ir_shift = (self.ir_shift >> 1) | (pins.tdi as u8) << (IR_WIDTH - 1);
            }
            JtagState::CaptureDR => self.dr = feedback.held,
            JtagState::ShiftDR => {
                let (dr, out) = shift_masked(self.dr, feedback, pins.tdi);
                self.dr = dr;
                self.tdo = out;
            }
            _ => {}
        }

        let next = self.state.next(pins.tms);
        if next != self.state {
            trace!("tap {:?} -> {:?}", self.state, next);
        }
        match next {
            JtagState::Reset => self.ir = Instruction::RESET,
            JtagState::UpdateIR => {
                self.ir = Instruction::new(self.ir_shift);
                debug!("ir updated to {:#04x}", self.ir.code());
            }
            _ => {}
        }
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(tap: &mut TapController, tms: &[bool], feedback: DrFeedback) {
        for &t in tms {
            tap.tick(JtagPins::new(t, false), feedback);
        }
    }

    fn shift_ir(tap: &mut TapController, code: u8) -> u8 {
        drive(tap, &[false, true, true, false, false], DrFeedback::default());
        assert_eq!(tap.state(), JtagState::ShiftIR);
        let mut out = 0;
        for i in 0..IR_WIDTH {
            let last = i == IR_WIDTH - 1;
            tap.tick(JtagPins::new(last, code >> i & 1 != 0), DrFeedback::default());
            out |= (tap.tdo() as u8) << i;
        }
        drive(tap, &[true, false], DrFeedback::default());
        out
    }

    #[test]
    fn instruction_latched_only_at_update() {
        let mut tap = TapController::new();
        drive(&mut tap, &[false, true, true, false, false], DrFeedback::default());
        for _ in 0..4 {
            tap.tick(JtagPins::new(false, true), DrFeedback::default());
        }
        tap.tick(JtagPins::new(true, true), DrFeedback::default());
        assert_eq!(tap.state(), JtagState::Exit1IR);
        assert_eq!(tap.instruction(), Instruction::RESET);
        tap.tick(JtagPins::new(false, false), DrFeedback::default());
        assert_eq!(tap.state(), JtagState::PauseIR);
        assert_eq!(tap.instruction(), Instruction::RESET);
        drive(&mut tap, &[true, true], DrFeedback::default());
        assert_eq!(tap.state(), JtagState::UpdateIR);
        assert_eq!(tap.instruction().code(), 0x1f);
    }

    #[test]
    fn ir_capture_pattern_shifts_out() {
        let mut tap = TapController::new();
        assert_eq!(shift_ir(&mut tap, 0x11), IR_CAPTURE);
        assert_eq!(tap.instruction().code(), 0x11);
        assert_eq!(tap.state(), JtagState::Idle);
    }

    #[test]
    fn reset_state_clears_instruction() {
        let mut tap = TapController::new();
        shift_ir(&mut tap, 0x10);
        assert_eq!(tap.instruction().code(), 0x10);
        drive(&mut tap, &[true; 5], DrFeedback::default());
        assert_eq!(tap.state(), JtagState::Reset);
        assert_eq!(tap.instruction(), Instruction::RESET);
    }

    #[test]
    fn trst_resets_mid_shift() {
        let mut tap = TapController::new();
        let fb = DrFeedback::register(8, 0xa5);
        drive(&mut tap, &[false, true, false, false, false, false], fb);
        assert_eq!(tap.state(), JtagState::ShiftDR);
        tap.tick(JtagPins { ntrst: false, tms: false, tdi: true }, fb);
        assert_eq!(tap.state(), JtagState::Reset);
        assert_eq!(tap.dr_in(), DrBits::ZERO);
        assert_eq!(tap.instruction(), Instruction::RESET);
    }

    #[test]
    fn capture_then_shift_out_lsb_first() {
        let mut tap = TapController::new();
        let fb = DrFeedback::register(8, 0b1011_0010);
        drive(&mut tap, &[false, true, false, false], fb);
        assert_eq!(tap.state(), JtagState::ShiftDR);
        assert_eq!(tap.dr_in().value(), 0b1011_0010);

        let mut out = 0u32;
        for i in 0..8 {
            tap.tick(JtagPins::new(false, true), fb);
            out |= (tap.tdo() as u32) << i;
        }
        assert_eq!(out, 0b1011_0010);
        assert_eq!(tap.dr_in().value(), 0xff);
    }

    #[test]
    fn sparse_mask_keeps_held_bits() {
        // Bits 0, 4 and 49 shift; everything else holds 0x3c0
        let mask = DrBits::ZERO.with_bit(0, true).with_bit(4, true).with_bit(49, true);
        let fb = DrFeedback { mask, held: DrBits::new(0x3c0) };
        let (dr, out) = shift_masked(DrBits::new(0x3c0), fb, true);
        assert!(!out);
        assert!(dr.bit(49));
        assert!(!dr.bit(4));
        assert_eq!((dr & !mask).value(), 0x3c0);

        let (dr, out) = shift_masked(dr, fb, false);
        assert!(!out);
        assert!(!dr.bit(49));
        assert!(dr.bit(4));
        let (dr, _) = shift_masked(dr, fb, false);
        assert!(dr.bit(0));
    }

    #[test]
    fn empty_mask_passes_tdi_through() {
        let fb = DrFeedback { mask: DrBits::ZERO, held: DrBits::new(7) };
        assert_eq!(shift_masked(DrBits::ALL, fb, true), (DrBits::new(7), true));
    }
}
