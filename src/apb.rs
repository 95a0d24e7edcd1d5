//! The register bus: a simple non-pipelined address/data bus with a two-phase transfer (setup,
//! then access held until the target stops answering not-ready).
use alloc::vec::Vec;

use tracing::trace;

use crate::error::Error;

/// Bus request, as driven by a master for one bus clock
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ApbRequest {
    pub select: bool,
    pub enable: bool,
    pub address: u32,
    pub write_enable: bool,
    pub write_data: u32,
}

impl ApbRequest {
    pub const IDLE: ApbRequest = ApbRequest {
        select: false,
        enable: false,
        address: 0,
        write_enable: false,
        write_data: 0,
    };

    pub fn setup(address: u32, write_enable: bool, write_data: u32) -> Self {
        Self {
            select: true,
            enable: false,
            address,
            write_enable,
            write_data,
        }
    }

    #[must_use]
    pub fn access(self) -> Self {
        Self { enable: true, ..self }
    }

    /// Second phase of a transfer; this is when targets act
    pub fn is_access(&self) -> bool {
        self.select && self.enable
    }
}

/// Bus response.  Only meaningful in the access phase.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ApbResponse {
    pub read_data: u32,
    pub error: bool,
    pub not_ready: bool,
}

impl ApbResponse {
    pub const OK: ApbResponse = ApbResponse {
        read_data: 0,
        error: false,
        not_ready: false,
    };
    pub const ERROR: ApbResponse = ApbResponse {
        read_data: 0,
        error: true,
        not_ready: false,
    };
    pub const WAIT: ApbResponse = ApbResponse {
        read_data: 0,
        error: false,
        not_ready: true,
    };

    pub fn data(read_data: u32) -> Self {
        Self { read_data, ..Self::OK }
    }
}

/// A bus target, clocked in the bus domain
pub trait ApbTarget {
    /// Present `request` for one bus clock and return the response for that clock.  Called on
    /// every bus clock, idle ones included, so the target can run its own clocked logic here.
    /// A write takes effect on the access-phase clock whose response is ready.
    fn access(&mut self, request: &ApbRequest) -> ApbResponse;
}

impl<T: ApbTarget + ?Sized> ApbTarget for &mut T {
    fn access(&mut self, request: &ApbRequest) -> ApbResponse {
        (**self).access(request)
    }
}

/// Blocking master view of a bus, for software running on the bus side
pub trait ApbBus {
    fn read(&mut self, address: u32) -> Result<u32, Error>;
    fn write(&mut self, address: u32, data: u32) -> Result<(), Error>;
}

/// Run one complete transfer against `target`, calling `each_cycle` after every bus clock so the
/// caller can advance other clock domains.  Gives up with `Error::BusTimeout` after
/// `max_wait_cycles` not-ready clocks.
pub fn transfer<T, F>(
    target: &mut T,
    address: u32,
    write: Option<u32>,
    max_wait_cycles: u32,
    mut each_cycle: F,
) -> Result<u32, Error>
where
    T: ApbTarget + ?Sized,
    F: FnMut(&mut T),
{
    let setup = ApbRequest::setup(address, write.is_some(), write.unwrap_or(0));
    target.access(&setup);
    each_cycle(target);

    let access = setup.access();
    let mut waited = 0;
    loop {
        let response = target.access(&access);
        each_cycle(target);
        if !response.not_ready {
            trace!("apb {} {:#x} -> {:?}", if write.is_some() { "write" } else { "read" }, address, response);
            if response.error {
                return Err(Error::Bus { address });
            }
            return Ok(response.read_data);
        }
        waited += 1;
        if waited >= max_wait_cycles {
            return Err(Error::BusTimeout { address, cycles: waited });
        }
    }
}

/// One completed transfer, as recorded by `ApbMemory`
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ApbAccess {
    pub address: u32,
    pub write: bool,
    pub data: u32,
}

/// Word-addressed memory target.  Inserts `wait_states` not-ready clocks into every access and
/// answers with an error outside its size.  Every completed access is logged.
pub struct ApbMemory {
    words: Vec<u32>,
    wait_states: u32,
    waited: u32,
    accesses: Vec<ApbAccess>,
}

impl ApbMemory {
    pub fn new(words: usize) -> Self {
        Self {
            words: alloc::vec![0; words],
            wait_states: 0,
            waited: 0,
            accesses: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_wait_states(mut self, wait_states: u32) -> Self {
        self.wait_states = wait_states;
        self
    }

    pub fn set_wait_states(&mut self, wait_states: u32) {
        self.wait_states = wait_states;
    }

    pub fn word(&self, address: u32) -> Option<u32> {
        self.words.get(address as usize / 4).copied()
    }

    pub fn set_word(&mut self, address: u32, value: u32) {
        if let Some(w) = self.words.get_mut(address as usize / 4) {
            *w = value;
        }
    }

    pub fn accesses(&self) -> &[ApbAccess] {
        &self.accesses
    }
}

impl ApbTarget for ApbMemory {
    fn access(&mut self, request: &ApbRequest) -> ApbResponse {
        if !request.is_access() {
            self.waited = 0;
            return ApbResponse::OK;
        }
        if self.waited < self.wait_states {
            self.waited += 1;
            return ApbResponse::WAIT;
        }
        self.waited = 0;

        let Some(word) = self.words.get_mut(request.address as usize / 4) else {
            return ApbResponse::ERROR;
        };
        let data = if request.write_enable {
            *word = request.write_data;
            request.write_data
        } else {
            *word
        };
        self.accesses.push(ApbAccess {
            address: request.address,
            write: request.write_enable,
            data,
        });
        ApbResponse::data(if request.write_enable { 0 } else { data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_read_write() {
        let mut mem = ApbMemory::new(4);
        assert_eq!(transfer(&mut mem, 0x8, Some(0xdead_beef), 4, |_| {}), Ok(0));
        assert_eq!(transfer(&mut mem, 0x8, None, 4, |_| {}), Ok(0xdead_beef));
        assert_eq!(mem.word(0x8), Some(0xdead_beef));
        assert_eq!(mem.accesses().len(), 2);
        assert!(mem.accesses()[0].write);
    }

    #[test]
    fn memory_errors_out_of_range() {
        let mut mem = ApbMemory::new(4);
        assert_eq!(transfer(&mut mem, 0x10, None, 4, |_| {}), Err(Error::Bus { address: 0x10 }));
        assert!(mem.accesses().is_empty());
    }

    #[test]
    fn wait_states_then_timeout() {
        let mut mem = ApbMemory::new(1).with_wait_states(3);
        let mut cycles = 0;
        assert_eq!(transfer(&mut mem, 0, None, 8, |_| cycles += 1), Ok(0));
        assert_eq!(cycles, 5);

        mem.set_wait_states(u32::MAX);
        assert_eq!(
            transfer(&mut mem, 0, None, 8, |_| {}),
            Err(Error::BusTimeout { address: 0, cycles: 8 })
        );
    }
}
