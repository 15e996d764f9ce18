use libc::c_int;

use crate::hal::{GpioBackend, GpioError};

#[link(name = "wiringPi")]
extern "C" {
    fn wiringPiSetup() -> c_int;
    fn pinMode(pin: c_int, mode: c_int);
    fn digitalRead(pin: c_int) -> c_int;
    fn digitalWrite(pin: c_int, value: c_int);
    fn pullUpDnControl(pin: c_int, pud: c_int);
}

/// The system `libwiringPi`. Pins use wiringPi numbering.
#[derive(Debug, Default)]
pub struct WiringPi;

impl GpioBackend for WiringPi {
    fn setup(&mut self) -> Result<(), GpioError> {
        match unsafe { wiringPiSetup() } {
            0 => Ok(()),
            code => Err(GpioError::Setup(code)),
        }
    }

    fn pin_mode(&mut self, pin: i32, mode: i32) {
        unsafe { pinMode(pin, mode) }
    }

    fn digital_read(&mut self, pin: i32) -> i32 {
        unsafe { digitalRead(pin) }
    }

    fn digital_write(&mut self, pin: i32, value: i32) {
        unsafe { digitalWrite(pin, value) }
    }

    fn pull_up_dn_control(&mut self, pin: i32, pud: i32) {
        unsafe { pullUpDnControl(pin, pud) }
    }
}
