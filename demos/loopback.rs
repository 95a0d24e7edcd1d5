use jtag_apb::apb::ApbMemory;
use jtag_apb::cable::apb::ApbCable;
use jtag_apb::probe::{BusProbe, ProbeConfig};
use jtag_apb::system::{LoopbackConfig, LoopbackSystem};

fn main() -> Result<(), jtag_apb::Error> {
    tracing_subscriber::fmt::init();

    // bus software -> ApbTargetJtag -> downstream TAP and bridge -> memory
    let mut memory = ApbMemory::new(256);
    memory.set_word(0x40, 0x600d_f00d);
    let system = LoopbackSystem::new(memory, LoopbackConfig::default());
    let cable = ApbCable::new(system, 0, 64);
    let mut probe = BusProbe::new(cable, ProbeConfig::default())?;

    println!("idcode: {:#010x}", probe.read_idcode()?);
    println!("mem[0x40]: {:#010x}", probe.read(0x40)?);

    for (i, addr) in (0..0x20).step_by(4).enumerate() {
        probe.write(addr, 0x1111_1111 * i as u32)?;
    }
    print!("mem[0..0x20]:");
    for addr in (0..0x20).step_by(4) {
        print!(" {:x}", probe.read(addr)?);
    }
    println!();

    match probe.read(0x1000) {
        Ok(v) => println!("mem[0x1000]: {:#x}", v),
        Err(e) => {
            println!("mem[0x1000]: {}", e);
            probe.clear_status()?;
        }
    }

    let system = &probe.cable().bus;
    println!("bus cycles: {}", system.bus_cycles());
    println!("downstream accesses: {}", system.downstream.target.accesses().len());
    Ok(())
}
