//! Probe-side driver for a `JtagApbBridge`.  `BusProbe` turns bus reads and writes into scans:
//! it selects the right instruction, keeps the address page in BUS_CONTROL up to date, issues the
//! access through BUS_ACCESS and then polls until the bridge stops reporting busy.
//!
//! Instruction and page are cached, so back to back accesses within one 64k page cost one scan
//! each plus the polling.
use tracing::{debug, trace, warn};

use crate::bridge::regs::{AccessCapture, AccessCommand, ControlWord};
use crate::bridge::{AccessOp, StickyStatus, BUS_ACCESS, BUS_ACCESS_WIDTH, BUS_CONTROL, BUS_CONTROL_WIDTH, IDCODE, IDCODE_WIDTH};
use crate::cable::{bytes_of, value_of, Cable};
use crate::error::Error;
use crate::statemachine::{JtagSM, JtagState, Register};
use crate::tap::IR_WIDTH;

#[derive(Clone, Copy, Debug)]
pub struct ProbeConfig {
    /// Run-Test/Idle clocks between an access and each status poll
    pub idle_cycles: usize,
    /// Status polls before giving up on a busy bridge
    pub max_polls: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            idle_cycles: 8,
            max_polls: 64,
        }
    }
}

pub struct BusProbe<C> {
    sm: JtagSM<C>,
    config: ProbeConfig,
    last_ir: Option<u8>,
    last_page: Option<u16>,
}

impl<C: Cable> BusProbe<C> {
    /// Reset the TAP behind `cable` and take control of it
    pub fn new(cable: C, config: ProbeConfig) -> Result<Self, Error> {
        Ok(Self {
            sm: JtagSM::new(cable)?,
            config,
            last_ir: Some(IDCODE),
            last_page: None,
        })
    }

    pub fn cable(&mut self) -> &mut C {
        &mut self.sm.cable
    }

    pub fn into_cable(self) -> C {
        self.sm.cable
    }

    pub fn state(&self) -> JtagState {
        self.sm.state()
    }

    /// Walk the TAP through Test-Logic-Reset.  The bridge keeps its page and status.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.last_ir = None;
        self.sm.mode_reset()?;
        self.last_ir = Some(IDCODE);
        Ok(())
    }

    fn select(&mut self, code: u8) -> Result<(), Error> {
        if self.last_ir == Some(code) {
            return Ok(());
        }

        // clear it, so if the scan fails partway we don't trust the cache
        self.last_ir = None;
        trace!("select instruction {:#04x}", code);
        self.sm.write_reg(Register::Instruction, &[code], IR_WIDTH as u8, true)?;
        self.sm.change_mode(JtagState::Idle)?;
        self.last_ir = Some(code);
        Ok(())
    }

    /// Scan `value` through the selected data register and return what was captured
    fn scan(&mut self, width: usize, value: u64) -> Result<u64, Error> {
        let (bytes, bits) = bytes_of(value, width);
        let out = self.sm.read_write_reg(Register::Data, &bytes, bits, true)?;
        self.sm.change_mode(JtagState::Idle)?;
        Ok(value_of(&out))
    }

    pub fn read_idcode(&mut self) -> Result<u32, Error> {
        self.select(IDCODE)?;
        let idcode = self.scan(IDCODE_WIDTH, 0)? as u32;
        debug!("idcode {:#010x}", idcode);
        Ok(idcode)
    }

    fn control_scan(&mut self, clear: bool) -> Result<ControlWord, Error> {
        // cleared until the scan lands, as with the instruction cache
        let known = self.last_page.take();
        self.select(BUS_CONTROL)?;

        let captured = match known {
            Some(page) => self.control_update(page, clear)?,
            None => {
                // The bridge's page is unknown, so read it first and write the same page back
                // from within one Shift-DR
                let (bytes, bits) = bytes_of(0, BUS_CONTROL_WIDTH);
                let out = self.sm.read_write_reg(Register::Data, &bytes, bits, false)?;
                let captured = ControlWord(value_of(&out) as u32);
                trace!("bridge page is {:#06x}", captured.page());
                self.control_update(captured.page(), clear)?;
                captured
            }
        };
        self.last_page = Some(known.unwrap_or(captured.page()));
        Ok(captured)
    }

    fn control_update(&mut self, page: u16, clear: bool) -> Result<ControlWord, Error> {
        let mut control = ControlWord(0);
        control.set_page(page);
        control.set_clear_sticky(clear);
        Ok(ControlWord(self.scan(BUS_CONTROL_WIDTH, control.0 as u64)? as u32))
    }

    /// Point the upper 16 address bits of later accesses at `page`
    pub fn set_page(&mut self, page: u16) -> Result<(), Error> {
        if self.last_page == Some(page) {
            return Ok(());
        }
        self.last_page = Some(page);
        trace!("page {:#06x}", page);
        self.control_scan(false).map(|_| ())
    }

    /// Sticky status, busy and page, leaving all of them as they are
    pub fn read_control(&mut self) -> Result<ControlWord, Error> {
        self.control_scan(false)
    }

    /// Clear the sticky status, returning the control word from before the clear
    pub fn clear_status(&mut self) -> Result<ControlWord, Error> {
        let control = self.control_scan(true)?;
        debug!("cleared bridge status {:?}", control);
        Ok(control)
    }

    fn issue(&mut self, address: u32, op: AccessOp, data: u32) -> Result<AccessCapture, Error> {
        self.set_page((address >> 16) as u16)?;
        self.select(BUS_ACCESS)?;

        let mut command = AccessCommand(0);
        command.set_op(op as u8);
        command.set_data(data);
        command.set_address(address as u16);
        trace!("{:?} {:#x} data {:#x}", op, address, data);
        Ok(AccessCapture(self.scan(BUS_ACCESS_WIDTH, command.0)?))
    }

    fn sticky_error(&mut self, address: u32) -> Result<Error, Error> {
        let control = self.read_control()?;
        let status = StickyStatus {
            bus_error: control.bus_error(),
            timeout: control.timeout(),
            overrun: control.overrun(),
        };
        warn!("bridge status {:?} after access to {:#x}", status, address);
        Ok(Error::Bridge { address, status })
    }

    /// Poll BUS_ACCESS until nothing is outstanding
    fn wait(&mut self, address: u32) -> Result<AccessCapture, Error> {
        for _ in 0..self.config.max_polls {
            self.sm.run_test_idle(self.config.idle_cycles)?;
            self.select(BUS_ACCESS)?;
            let capture = AccessCapture(self.scan(BUS_ACCESS_WIDTH, AccessCommand(0).0)?);
            if capture.error() {
                return Err(self.sticky_error(address)?);
            }
            if !capture.busy() {
                return Ok(capture);
            }
            trace!("bridge busy");
        }
        Err(Error::BridgeBusy { polls: self.config.max_polls })
    }

    pub fn write(&mut self, address: u32, data: u32) -> Result<(), Error> {
        self.issue(address, AccessOp::Write, data)?;
        self.wait(address)?;
        debug!("wrote {:#x} to {:#x}", data, address);
        Ok(())
    }

    pub fn read(&mut self, address: u32) -> Result<u32, Error> {
        self.issue(address, AccessOp::Read, 0)?;
        let data = self.wait(address)?.read_data();
        debug!("read {:#x} from {:#x}", data, address);
        Ok(data)
    }

    /// Issue a read of `address` without waiting for it.  The returned capture was taken by the
    /// same scan, so it holds the result of the access before this one; it is only complete if
    /// its busy bit is clear.  `flush` collects the last result.
    pub fn read_pipelined(&mut self, address: u32) -> Result<AccessCapture, Error> {
        let capture = self.issue(address, AccessOp::Read, 0)?;
        self.sm.run_test_idle(self.config.idle_cycles)?;
        Ok(capture)
    }

    /// Wait for everything outstanding and return the final capture
    pub fn flush(&mut self) -> Result<AccessCapture, Error> {
        let address = self.last_page.map_or(0, |page| (page as u32) << 16);
        self.wait(address)
    }
}
