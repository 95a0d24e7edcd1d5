//! Ways of driving a TAP.  Every cable implements `Cable`; the only thing a cable has to provide is
//! `clock`, a single TCK cycle, and the byte-oriented shifting methods are built from it.  Cables
//! that can do better (such as `ApbCable`, which batches TDO reads) override them.
//!
//! Bytes are packed LSB first: bit 0 of byte 0 is the first bit onto TDI and the first bit read
//! from TDO.  `bits` is the number of bits used in the last byte, from 1 to 8.
use alloc::vec::Vec;

use crate::error::Error;

pub mod apb;
pub mod gpio;
pub mod sim;

pub trait Cable {
    /// Drive TMS and TDI, clock TCK once, and return TDO as sampled after the rising edge
    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, Error>;

    /// Clock out a series of TMS values to change the state of the JTAG chain.  `tdi` is the
    /// level held on TDI during the mode change.
    fn change_mode(&mut self, tms: &[bool], tdi: bool) -> Result<(), Error> {
        for &t in tms {
            self.clock(t, tdi)?;
        }
        Ok(())
    }

    /// Shift in `bits` bits from TDO, clocking out all ones.  Should be called with state =
    /// ShiftIR or ShiftDR, and will remain in that state.
    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, Error> {
        let mut out = BitPacker::default();
        for _ in 0..bits {
            out.push(self.clock(false, true)?);
        }
        Ok(out.finish())
    }

    /// Shift out bits on TDI.  Should be called with state = ShiftIR or ShiftDR.  State won't
    /// change unless `pause_after` is true, in which case it will be PauseIR or PauseDR on exit.
    fn write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<(), Error> {
        self.read_write_data(data, bits, pause_after).map(|_| ())
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, Error> {
        let tdi = unpack_bits(data, bits)?;
        let mut out = BitPacker::default();
        for (i, &bit) in tdi.iter().enumerate() {
            let last = i + 1 == tdi.len();
            // The last bit goes out with TMS high, moving to Exit1
            out.push(self.clock(last && pause_after, bit)?);
        }
        if pause_after {
            self.clock(false, false)?;
        }
        Ok(out.finish())
    }
}

impl<C: Cable + ?Sized> Cable for &mut C {
    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, Error> {
        (**self).clock(tms, tdi)
    }

    fn change_mode(&mut self, tms: &[bool], tdi: bool) -> Result<(), Error> {
        (**self).change_mode(tms, tdi)
    }

    fn read_data(&mut self, bits: usize) -> Result<Vec<u8>, Error> {
        (**self).read_data(bits)
    }

    fn read_write_data(&mut self, data: &[u8], bits: u8, pause_after: bool) -> Result<Vec<u8>, Error> {
        (**self).read_write_data(data, bits, pause_after)
    }
}

/// Expand `data` into single bits, LSB first, using `bits` bits of the last byte
pub fn unpack_bits(data: &[u8], bits: u8) -> Result<Vec<bool>, Error> {
    if bits == 0 || bits > 8 {
        return Err(Error::InvalidShift { bits });
    }
    let Some((last, whole)) = data.split_last() else {
        return Ok(Vec::new());
    };

    let mut out = Vec::with_capacity(whole.len() * 8 + bits as usize);
    for byte in whole {
        out.extend((0..8).map(|b| (*byte >> b) & 1 != 0));
    }
    out.extend((0..bits).map(|b| (*last >> b) & 1 != 0));
    Ok(out)
}

/// Collects bits LSB first into bytes; a partial last byte is kept right-aligned
#[derive(Default)]
pub struct BitPacker {
    bytes: Vec<u8>,
    count: usize,
}

impl BitPacker {
    pub fn push(&mut self, bit: bool) {
        let b = self.count % 8;
        if b == 0 {
            self.bytes.push(0);
        }
        if bit {
            if let Some(last) = self.bytes.last_mut() {
                *last |= 1 << b;
            }
        }
        self.count += 1;
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Split the low `bits` bits of `value` into LSB-first bytes plus the count used in the last one
///
/// # Panics
///
/// If `bits` is 0 or more than 64.
pub fn bytes_of(value: u64, bits: usize) -> (Vec<u8>, u8) {
    assert!(bits > 0 && bits <= 64);
    let len = bits.div_ceil(8);
    let mut bytes = value.to_le_bytes()[..len].to_vec();
    let last = match bits % 8 {
        0 => 8,
        n => n as u8,
    };
    if last < 8 {
        bytes[len - 1] &= (1 << last) - 1;
    }
    (bytes, last)
}

/// Inverse of `bytes_of`
pub fn value_of(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .enumerate()
        .fold(0, |v, (i, &b)| v | (b as u64) << (8 * i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn unpack_uses_partial_last_byte() {
        let bits = unpack_bits(&[0b1000_0001, 0b0000_0110], 3).unwrap();
        assert_eq!(bits.len(), 11);
        assert!(bits[0]);
        assert!(bits[7]);
        assert_eq!(&bits[8..], [false, true, true]);
        assert_eq!(unpack_bits(&[1], 0), Err(Error::InvalidShift { bits: 0 }));
        assert_eq!(unpack_bits(&[1], 9), Err(Error::InvalidShift { bits: 9 }));
    }

    #[test]
    fn packer_right_aligns() {
        let mut p = BitPacker::default();
        for b in [true, false, false, false, false, false, false, false, true, true] {
            p.push(b);
        }
        assert_eq!(p.finish(), vec![0x01, 0x03]);
    }

    #[test]
    #[should_panic]
    fn bytes_of_needs_at_least_one_bit() {
        bytes_of(1, 0);
    }

    #[test]
    #[should_panic]
    fn bytes_of_is_limited_to_a_word() {
        bytes_of(1, 65);
    }

    #[test]
    fn bytes_of_fifty_bits() {
        let (bytes, last) = bytes_of(0x3_ffff_ffff_ffff, 50);
        assert_eq!(bytes.len(), 7);
        assert_eq!(last, 2);
        assert_eq!(bytes[6], 0x03);
        assert_eq!(value_of(&bytes), 0x3_ffff_ffff_ffff);

        let (bytes, last) = bytes_of(0x1234_5678, 32);
        assert_eq!(bytes, [0x78, 0x56, 0x34, 0x12]);
        assert_eq!(last, 8);
    }
}
