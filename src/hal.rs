use pyo3::prelude::*;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub const INPUT: i32 = 0;
pub const OUTPUT: i32 = 1;

pub const LOW: i32 = 0;
pub const HIGH: i32 = 1;

pub const PUD_OFF: i32 = 0;
pub const PUD_DOWN: i32 = 1;
pub const PUD_UP: i32 = 2;

/// PIN MODE
#[pyclass(eq, eq_int)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    #[pyo3(name = "INPUT")]
    Input = 0,
    #[pyo3(name = "OUTPUT")]
    Output = 1,
}

/// PULL UP/DOWN
#[pyclass(eq, eq_int)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullUpDown {
    #[pyo3(name = "NONE")]
    Off = 0,
    #[pyo3(name = "DOWN")]
    Down = 1,
    #[pyo3(name = "UP")]
    Up = 2,
}

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("failed to open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("GPIO mmap failed: {0}")]
    Map(io::Error),
    #[error("hardware setup returned {0}")]
    Setup(i32),
    #[error("unsupported SoC {0}")]
    UnsupportedSoc(String),
    #[error("unknown GPIO backend {0:?}")]
    UnknownBackend(String),
}

impl GpioError {
    /// Numeric failure code reported in the setup diagnostic.
    pub fn code(&self) -> i32 {
        match self {
            GpioError::Open { source, .. } | GpioError::Map(source) => {
                source.raw_os_error().unwrap_or(-1)
            }
            GpioError::Setup(code) => *code,
            GpioError::UnsupportedSoc(_) => libc::ENODEV,
            GpioError::UnknownBackend(_) => -1,
        }
    }
}

impl From<PinMode> for i32 {
    fn from(mode: PinMode) -> i32 {
        mode as i32
    }
}

impl From<PullUpDown> for i32 {
    fn from(pud: PullUpDown) -> i32 {
        pud as i32
    }
}

/// Raw pin access, modelled on the wiringPi call surface.
///
/// Pin operations are only issued after `setup` has returned `Ok`.
pub trait GpioBackend {
    fn setup(&mut self) -> Result<(), GpioError>;
    fn pin_mode(&mut self, pin: i32, mode: i32);
    fn digital_read(&mut self, pin: i32) -> i32;
    fn digital_write(&mut self, pin: i32, value: i32);
    fn pull_up_dn_control(&mut self, pin: i32, pud: i32);
}

impl<B: GpioBackend + ?Sized> GpioBackend for Box<B> {
    fn setup(&mut self) -> Result<(), GpioError> {
        (**self).setup()
    }

    fn pin_mode(&mut self, pin: i32, mode: i32) {
        (**self).pin_mode(pin, mode)
    }

    fn digital_read(&mut self, pin: i32) -> i32 {
        (**self).digital_read(pin)
    }

    fn digital_write(&mut self, pin: i32, value: i32) {
        (**self).digital_write(pin, value)
    }

    fn pull_up_dn_control(&mut self, pin: i32, pud: i32) {
        (**self).pull_up_dn_control(pin, pud)
    }
}
