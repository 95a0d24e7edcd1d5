//! A cable wired straight to a simulated `JtagApbSystem`
use crate::apb::ApbTarget;
use crate::cable::Cable;
use crate::error::Error;
use crate::system::JtagApbSystem;
use crate::tap::JtagPins;

pub struct SimCable<T> {
    pub system: JtagApbSystem<T>,
}

impl<T: ApbTarget> SimCable<T> {
    pub fn new(system: JtagApbSystem<T>) -> Self {
        Self { system }
    }
}

impl<T: ApbTarget> Cable for SimCable<T> {
    fn clock(&mut self, tms: bool, tdi: bool) -> Result<bool, Error> {
        Ok(self.system.clock(JtagPins::new(tms, tdi)))
    }
}
