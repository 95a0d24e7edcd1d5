use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorKind, ErrorType, InputPin, OutputPin};
use jtag_apb::apb::ApbMemory;
use jtag_apb::cable::gpio::Gpio;
use jtag_apb::probe::{BusProbe, ProbeConfig};
use jtag_apb::statemachine::JtagSM;
use jtag_apb::system::{JtagApbSystem, SystemConfig};
use jtag_apb::tap::JtagPins;
use jtag_apb::Error;

/// The simulated target, plus the levels the fake pins are driving
struct Board {
    system: JtagApbSystem<ApbMemory>,
    tms: bool,
    tdi: bool,
    tck_edges: usize,
}

type Shared = Rc<RefCell<Board>>;

enum Line {
    Tck,
    Tms,
    Tdi,
}

struct Out(Shared, Line);
struct Tdo(Shared);
struct BrokenTdo;
struct NoDelay(u64);

impl ErrorType for Out {
    type Error = Infallible;
}

impl OutputPin for Out {
    fn set_low(&mut self) -> Result<(), Infallible> {
        let mut board = self.0.borrow_mut();
        match self.1 {
            Line::Tck => {}
            Line::Tms => board.tms = false,
            Line::Tdi => board.tdi = false,
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        let mut board = self.0.borrow_mut();
        match self.1 {
            Line::Tck => {
                let pins = JtagPins::new(board.tms, board.tdi);
                board.system.clock(pins);
                board.tck_edges += 1;
            }
            Line::Tms => board.tms = true,
            Line::Tdi => board.tdi = true,
        }
        Ok(())
    }
}

impl ErrorType for Tdo {
    type Error = Infallible;
}

impl InputPin for Tdo {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.0.borrow().system.tap.tdo())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|h| !h)
    }
}

impl ErrorType for BrokenTdo {
    type Error = ErrorKind;
}

impl InputPin for BrokenTdo {
    fn is_high(&mut self) -> Result<bool, ErrorKind> {
        Err(ErrorKind::Other)
    }

    fn is_low(&mut self) -> Result<bool, ErrorKind> {
        Err(ErrorKind::Other)
    }
}

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0 += ns as u64;
    }
}

fn board() -> Shared {
    Rc::new(RefCell::new(Board {
        system: JtagApbSystem::new(ApbMemory::new(16), SystemConfig::default()),
        tms: false,
        tdi: false,
        tck_edges: 0,
    }))
}

#[test]
fn bus_access_over_pins() {
    let board = board();
    let gpio = Gpio::new(
        1000,
        Out(board.clone(), Line::Tck),
        Out(board.clone(), Line::Tdi),
        Tdo(board.clone()),
        Out(board.clone(), Line::Tms),
        NoDelay(0),
    );
    assert_eq!(gpio.half_period_ns(), 500);

    let mut probe = BusProbe::new(gpio, ProbeConfig::default()).unwrap();
    assert_eq!(probe.read_idcode().unwrap(), 0xabcd_e6e3);
    probe.write(0x4, 0x55aa).unwrap();
    assert_eq!(probe.read(0x4).unwrap(), 0x55aa);

    let edges = board.borrow().tck_edges;
    let (_, _, _, _, delay) = probe.into_cable().release();
    assert_eq!(delay.0, edges as u64 * 1000);
    assert_eq!(board.borrow().system.target.word(0x4), Some(0x55aa));
}

#[test]
fn pin_failure_is_reported() {
    let board = board();
    let gpio = Gpio::new(
        1000,
        Out(board.clone(), Line::Tck),
        Out(board.clone(), Line::Tdi),
        BrokenTdo,
        Out(board.clone(), Line::Tms),
        NoDelay(0),
    );
    assert_eq!(JtagSM::new(gpio).err(), Some(Error::Pin(ErrorKind::Other)));
    assert_eq!(board.borrow().tck_edges, 1);
}
