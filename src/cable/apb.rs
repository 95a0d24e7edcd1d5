//! Implement the `Cable` trait on top of an `ApbTargetJtag`, for software on the bus side
use alloc::vec::Vec;

use tracing::trace;

use crate::apb::ApbBus;
use crate::cable::{unpack_bits, BitPacker, Cable};
use crate::error::Error;
use crate::target::regs::{self, Lines, Status};

pub struct ApbCable<B> {
    pub bus: B,
    base: u32,
    max_polls: u32,
}

impl<B: ApbBus> ApbCable<B> {
    /// `base` is the bus address of the `ApbTargetJtag`; `max_polls` bounds the STATUS reads
    /// spent waiting for each step.
    pub fn new(bus: B, base: u32, max_polls: u32) -> Self {
        Self { bus, base, max_polls }
    }

    fn wait_done(&mut self) -> Result<Status, Error> {
        for _ in 0..self.max_polls {
            let status = Status(self.bus.read(self.base + regs::STATUS)?);
            if status.done() {
                return Ok(status);
            }
        }
        Err(Error::NotComplete { polls: self.max_polls })
    }

    fn step(&mut self, tms: bool, tdi: bool) -> Result<Status, Error> {
        self.bus.write(self.base + regs::STEP, Lines::new(tms, tdi).0)?;
        self.wait_done()
    }

    /// Run `tdi` through the port, collecting TDO from the TDO register 32 bits at a time
    fn shift(&mut self, tdi: &[bool], tms_last: bool) -> Result<Vec<u8>, Error> {
        let mut out = BitPacker::default();
        self.bus.read(self.base + regs::TDO_CLEAR)?;

        for (n, chunk) in tdi.chunks(32).enumerate() {
            let last_chunk = (n + 1) * 32 >= tdi.len();
            for (i, &bit) in chunk.iter().enumerate() {
                let last = last_chunk && i + 1 == chunk.len();
                self.step(last && tms_last, bit)?;
            }
            let tdo = self.bus.read(self.base + regs::TDO_CLEAR)? >> (32 - chunk.len());
            trace!("collected {} tdo bits: {:#x}", chunk.len(), tdo);
            for i in 0..chunk.len() {
                out.push((tdo >> i) & 1 != 0);
            }
        }
        Ok(out.finish())
    }
}

impl<B: ApbBus> Cable for ApbCable<B> {
    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, Error> {
        Ok(self.step(tms, tdi)?.tdo())
    }

    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, Error> {
        self.shift(&alloc::vec![true; bits], false)
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, Error> {
        let tdi = unpack_bits(data, bits)?;
        let out = self.shift(&tdi, pause_after)?;
        if pause_after {
            self.step(false, false)?;
        }
        Ok(out)
    }
}
