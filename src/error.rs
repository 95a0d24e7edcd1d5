//! Errors for the Rust-level APIs.  Scan-protocol failures never show up here; those are status
//! bits that a probe reads back on a later capture.
use thiserror::Error;

use crate::bridge::StickyStatus;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A bus target answered with its error flag set
    #[error("bus error accessing {address:#x}")]
    Bus { address: u32 },

    /// A bus target kept not-ready asserted for too long
    #[error("bus access to {address:#x} still not ready after {cycles} cycles")]
    BusTimeout { address: u32, cycles: u32 },

    /// The downstream port did not report completion of a step
    #[error("scan port step not complete after {polls} polls")]
    NotComplete { polls: u32 },

    /// A probe-side operation kept seeing the bridge busy
    #[error("bridge still busy after {polls} polls")]
    BridgeBusy { polls: u32 },

    /// The bridge reported sticky status after an access; it stays set until cleared
    #[error("bridge status {status:?} after access to {address:#x}")]
    Bridge { address: u32, status: StickyStatus },

    #[error("gpio error: {0:?}")]
    Pin(embedded_hal::digital::ErrorKind),

    #[error("invalid shift of {bits} bits in the last byte")]
    InvalidShift { bits: u8 },
}

pub(crate) fn pin_error<E: embedded_hal::digital::Error>(e: E) -> Error {
    Error::Pin(e.kind())
}
