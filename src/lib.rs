//! This crate models, clock by clock, the pieces needed to reach a register bus through JTAG and
//! to drive JTAG from a register bus.
//!
//! On the target side there is a `TapController`, the standard sixteen-state TAP with a 5-bit
//! instruction register and a data register path whose width and capture value are supplied from
//! outside.  Behind it sits the `JtagApbBridge`, which owns those data registers: IDCODE, a
//! control register, and a 50-bit access register whose Update-DR turns into an APB-style bus
//! transfer in a separate clock domain.  The `ApbTargetJtag` goes the other way: a bus target
//! that bit-bangs a downstream TAP, one step at a time or from a stream of remote-bitbang
//! command bytes.
//!
//! On the probe side, a `Cable` clocks TMS and TDI and returns TDO.  Cables exist for the
//! simulated system, for a bus-attached `ApbTargetJtag`, and for embedded-hal GPIO pins.  The
//! `JtagSM` keeps track of the mode of the TAP and gets to whichever mode you ask for with the
//! fewest clocks.  `BusProbe` sits on top of that and does bus reads and writes through the
//! bridge.
//!
//! Clock domains are advanced explicitly by calling their tick methods; `system` has harnesses
//! that wire everything together.
//!
//! # Example
//! ```
//! use jtag_apb::apb::ApbMemory;
//! use jtag_apb::cable::sim::SimCable;
//! use jtag_apb::probe::{BusProbe, ProbeConfig};
//! use jtag_apb::system::{JtagApbSystem, SystemConfig};
//!
//! let system = JtagApbSystem::new(ApbMemory::new(64), SystemConfig::default());
//! let mut probe = BusProbe::new(SimCable::new(system), ProbeConfig::default())?;
//! assert_eq!(probe.read_idcode()?, 0xabcd_e6e3);
//!
//! probe.write(0x10, 0x1234)?;
//! assert_eq!(probe.read(0x10)?, 0x1234);
//! # Ok::<(), jtag_apb::Error>(())
//! ```

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod apb;
pub mod bits;
pub mod bridge;
pub mod cable;
pub mod cdc;
pub mod error;
pub mod probe;
pub mod statemachine;
pub mod system;
pub mod tap;
pub mod target;

pub use error::Error;
