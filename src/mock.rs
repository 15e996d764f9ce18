//! In-memory backend for machines without GPIO hardware.

use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::hal::{GpioBackend, GpioError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Setup,
    PinMode(i32, i32),
    DigitalRead(i32),
    DigitalWrite(i32, i32),
    PullUpDnControl(i32, i32),
}

/// Shared record of every call a `MockGpio` received.
pub type CallLog = Rc<RefCell<Vec<Call>>>;

#[derive(Default)]
pub struct MockGpio {
    calls: CallLog,
    levels: HashMap<i32, i32>,
    failures_left: u32,
    failure_code: i32,
}

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` setup attempts fail with `code`.
    pub fn failing_setup(mut self, code: i32, times: u32) -> Self {
        self.failure_code = code;
        self.failures_left = times;
        self
    }

    pub fn calls(&self) -> CallLog {
        Rc::clone(&self.calls)
    }

    /// Drive an input pin from outside, as a connected circuit would.
    pub fn set_level(&mut self, pin: i32, level: i32) {
        self.levels.insert(pin, level);
    }

    fn record(&self, call: Call) {
        debug!("mock gpio: {call:?}");
        self.calls.borrow_mut().push(call);
    }
}

impl GpioBackend for MockGpio {
    fn setup(&mut self) -> Result<(), GpioError> {
        self.record(Call::Setup);
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(GpioError::Setup(self.failure_code));
        }
        Ok(())
    }

    fn pin_mode(&mut self, pin: i32, mode: i32) {
        self.record(Call::PinMode(pin, mode));
    }

    fn digital_read(&mut self, pin: i32) -> i32 {
        self.record(Call::DigitalRead(pin));
        self.levels.get(&pin).copied().unwrap_or(0)
    }

    fn digital_write(&mut self, pin: i32, value: i32) {
        self.record(Call::DigitalWrite(pin, value));
        self.levels.insert(pin, value);
    }

    fn pull_up_dn_control(&mut self, pin: i32, pud: i32) {
        self.record(Call::PullUpDnControl(pin, pud));
    }
}
