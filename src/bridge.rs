use log::{debug, error};

use crate::hal::{GpioBackend, HIGH, LOW};

/// Handle over a GPIO backend that sets the hardware up on first use.
///
/// Every pin operation first runs [`Bridge::ensure_setup`]. While setup keeps
/// failing, operations return `None` and nothing reaches the backend.
pub struct Bridge<B> {
    backend: B,
    initialized: bool,
}

impl<B: GpioBackend> Bridge<B> {
    pub fn new(backend: B) -> Self {
        Bridge { backend, initialized: false }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn ensure_setup(&mut self) -> bool {
        if self.initialized {
            return true;
        }
        match self.backend.setup() {
            Ok(()) => {
                self.initialized = true;
                true
            }
            Err(e) => {
                error!("Could not set up GPIO: {} ({e})", e.code());
                false
            }
        }
    }

    pub fn pin_mode(&mut self, pin: i32, mode: i32) -> Option<()> {
        self.ensure_setup().then(|| {
            debug!("pinMode({pin}, {mode})");
            self.backend.pin_mode(pin, mode)
        })
    }

    pub fn digital_read(&mut self, pin: i32) -> Option<bool> {
        self.ensure_setup().then(|| self.backend.digital_read(pin) != LOW)
    }

    pub fn digital_write(&mut self, pin: i32, value: bool) -> Option<()> {
        self.ensure_setup().then(|| {
            let level = if value { HIGH } else { LOW };
            debug!("digitalWrite({pin}, {level})");
            self.backend.digital_write(pin, level)
        })
    }

    pub fn pull_up_dn_control(&mut self, pin: i32, pud: i32) -> Option<()> {
        self.ensure_setup().then(|| {
            debug!("pullUpDnControl({pin}, {pud})");
            self.backend.pull_up_dn_control(pin, pud)
        })
    }
}
