//! Register ports and the state-injection bank
//!
//! Three single-channel output ports connect the host to the accelerator:
//! the load strobe and the two halves of the initial state. The halves are
//! written low first, then high, with no atomicity between the writes; the
//! accelerator only samples them on the strobe's rising edge.

use crate::buffer::{Armed, DmaRegion, ReceiveBuffer};
use crate::config::PortConfig;
use life_chip::grid;
use std::fmt::Debug;
use tracing::{debug, info};

/// Memory-mapped output register - unified interface for hardware and simulation
pub trait RegisterPort: Debug {
    /// Build-time configuration this port was created from
    fn config(&self) -> &PortConfig;

    /// Drive every bit of channel 1 as an output
    fn set_output_mode(&mut self);

    /// Write channel 1 data
    fn write(&mut self, value: u32);

    /// Read back channel 1 data
    fn read(&self) -> u32;
}

/// The three ports that load a state and start the accelerator
#[derive(Debug)]
pub struct InjectionPorts<P> {
    load: P,
    data_lo: P,
    data_hi: P,
}

impl<P: RegisterPort> InjectionPorts<P> {
    /// Put the ports in output mode and drive the strobe low
    pub fn new(mut load: P, mut data_lo: P, mut data_hi: P) -> Self {
        load.set_output_mode();
        data_lo.set_output_mode();
        data_hi.set_output_mode();
        load.write(0);
        debug!(
            "Injection ports ready: load={:#x} lo={:#x} hi={:#x}",
            load.config().base_address,
            data_lo.config().base_address,
            data_hi.config().base_address
        );
        Self {
            load,
            data_lo,
            data_hi,
        }
    }

    /// Present a 64-bit state on the data ports (low half, then high half)
    pub fn write_state(&mut self, state: u64) {
        let (lo, hi) = grid::split(state);
        self.data_lo.write(lo);
        self.data_hi.write(hi);
        info!("Initial data {state:#x} written to data ports (lo={lo:#010x}, hi={hi:#010x})");
    }

    /// State currently latched in the data ports
    pub fn latched_state(&self) -> u64 {
        grid::join(self.data_lo.read(), self.data_hi.read())
    }

    /// Pulse the load strobe (1, then 0)
    ///
    /// Borrowing an armed receive buffer is the proof that the engine will
    /// catch the block this pulse produces.
    pub fn pulse_trigger<R: DmaRegion>(&mut self, armed: &ReceiveBuffer<R, Armed>) {
        self.load.write(1);
        self.load.write(0);
        info!(
            "Load pulse sent, receive armed at {:#x}",
            armed.bus_address()
        );
    }

    /// Load-strobe port
    pub const fn load(&self) -> &P {
        &self.load
    }

    /// Low-half data port
    pub const fn data_lo(&self) -> &P {
        &self.data_lo
    }

    /// High-half data port
    pub const fn data_hi(&self) -> &P {
        &self.data_hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(&'static str, u32)>>>;

    #[derive(Debug)]
    struct LoggingPort {
        name: &'static str,
        config: PortConfig,
        value: u32,
        output: bool,
        log: Log,
    }

    impl LoggingPort {
        fn new(name: &'static str, width_bits: u32, log: &Log) -> Self {
            Self {
                name,
                config: PortConfig::single(0, width_bits),
                value: 0,
                output: false,
                log: Rc::clone(log),
            }
        }
    }

    impl RegisterPort for LoggingPort {
        fn config(&self) -> &PortConfig {
            &self.config
        }

        fn set_output_mode(&mut self) {
            self.output = true;
        }

        fn write(&mut self, value: u32) {
            assert!(self.output, "{} written before output mode", self.name);
            self.value = value;
            self.log.borrow_mut().push((self.name, value));
        }

        fn read(&self) -> u32 {
            self.value
        }
    }

    fn bank(log: &Log) -> InjectionPorts<LoggingPort> {
        InjectionPorts::new(
            LoggingPort::new("load", 1, log),
            LoggingPort::new("lo", 32, log),
            LoggingPort::new("hi", 32, log),
        )
    }

    #[test]
    fn new_drives_strobe_low() {
        let log = Log::default();
        let ports = bank(&log);
        assert_eq!(*log.borrow(), vec![("load", 0)]);
        assert!(ports.load().output && ports.data_lo().output && ports.data_hi().output);
    }

    #[test]
    fn state_is_written_low_half_first() {
        let log = Log::default();
        let mut ports = bank(&log);
        ports.write_state(0x0123_4567_89AB_CDEF);
        assert_eq!(
            log.borrow()[1..],
            [("lo", 0x89AB_CDEF), ("hi", 0x0123_4567)]
        );
        assert_eq!(ports.latched_state(), 0x0123_4567_89AB_CDEF);
    }
}
