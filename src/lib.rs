use log::warn;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyTuple;
use std::env;

pub mod bridge;
pub mod config;
pub mod gpio;
pub mod hal;
pub mod mock;
#[cfg(feature = "wiringpi")]
pub mod wiringpi;

use bridge::Bridge;
use config::{BackendKind, Config, BACKEND_VAR, DEVICE_VAR};
use hal::{GpioBackend, PinMode, PullUpDown};

const EXPORTS: [&str; 4] = ["pinMode", "digitalRead", "digitalWrite", "pullUpDnControl"];

/// Python handle over one [`Bridge`].
///
/// Pin calls take variadic arguments: with too few of them, or while the
/// hardware cannot be set up, they return `None` and touch no pin.
#[pyclass(unsendable)]
pub struct GpioBridge {
    inner: Bridge<Box<dyn GpioBackend>>,
}

impl GpioBridge {
    pub fn with_backend(backend: Box<dyn GpioBackend>) -> Self {
        GpioBridge { inner: Bridge::new(backend) }
    }

    // setup is attempted before the arity check
    fn ready(&mut self, args: &Bound<'_, PyTuple>, needed: usize) -> bool {
        self.inner.ensure_setup() && args.len() >= needed
    }
}

/// Mode arguments accept the exported enum as well as a plain `int`.
fn mode_arg<E>(arg: &Bound<'_, PyAny>) -> PyResult<i32>
where
    E: for<'py> FromPyObject<'py> + Into<i32>,
{
    match arg.extract::<E>() {
        Ok(mode) => Ok(mode.into()),
        Err(_) => arg.extract(),
    }
}

#[pymethods]
impl GpioBridge {
    #[new]
    #[pyo3(signature = (backend=None, device=None))]
    fn new(backend: Option<&str>, device: Option<String>) -> PyResult<Self> {
        let config = Config::from_lookup(|key| match key {
            BACKEND_VAR if backend.is_some() => backend.map(str::to_string),
            DEVICE_VAR if device.is_some() => device.clone(),
            _ => env::var(key).ok(),
        })
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(Self::with_backend(config.build_backend()))
    }

    #[pyo3(name = "ensureSetup")]
    fn ensure_setup(&mut self) -> bool {
        self.inner.ensure_setup()
    }

    #[getter]
    fn initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    #[pyo3(name = "pinMode", signature = (*args))]
    fn pin_mode(&mut self, args: &Bound<'_, PyTuple>) -> PyResult<()> {
        if !self.ready(args, 2) {
            return Ok(());
        }
        let pin = args.get_item(0)?.extract()?;
        let mode = mode_arg::<PinMode>(&args.get_item(1)?)?;
        self.inner.pin_mode(pin, mode);
        Ok(())
    }

    #[pyo3(name = "digitalRead", signature = (*args))]
    fn digital_read(&mut self, args: &Bound<'_, PyTuple>) -> PyResult<Option<bool>> {
        if !self.ready(args, 1) {
            return Ok(None);
        }
        let pin = args.get_item(0)?.extract()?;
        Ok(self.inner.digital_read(pin))
    }

    #[pyo3(name = "digitalWrite", signature = (*args))]
    fn digital_write(&mut self, args: &Bound<'_, PyTuple>) -> PyResult<()> {
        if !self.ready(args, 2) {
            return Ok(());
        }
        let pin = args.get_item(0)?.extract()?;
        let value = args.get_item(1)?.is_truthy()?;
        self.inner.digital_write(pin, value);
        Ok(())
    }

    #[pyo3(name = "pullUpDnControl", signature = (*args))]
    fn pull_up_dn_control(&mut self, args: &Bound<'_, PyTuple>) -> PyResult<()> {
        if !self.ready(args, 2) {
            return Ok(());
        }
        let pin = args.get_item(0)?.extract()?;
        let pud = mode_arg::<PullUpDown>(&args.get_item(1)?)?;
        self.inner.pull_up_dn_control(pin, pud);
        Ok(())
    }

    fn __repr__(&self) -> String {
        format!("<tinker_gpio.GpioBridge initialized={}>", self.inner.is_initialized())
    }
}

fn module_config() -> Config {
    Config::from_env().unwrap_or_else(|e| {
        warn!("{e}, falling back to {:?}", BackendKind::default());
        Config::from_lookup(|key| match key {
            BACKEND_VAR => None,
            _ => env::var(key).ok(),
        })
        .unwrap_or_default()
    })
}

fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let bridge = Bound::new(m.py(), GpioBridge::with_backend(module_config().build_backend()))?;
    for name in EXPORTS {
        m.add(name, bridge.getattr(name)?)?;
    }
    m.add("bridge", bridge)?;

    m.add_class::<GpioBridge>()?;
    m.add_class::<PinMode>()?;
    m.add_class::<PullUpDown>()?;

    m.add("INPUT", hal::INPUT)?;
    m.add("OUTPUT", hal::OUTPUT)?;
    m.add("LOW", hal::LOW)?;
    m.add("HIGH", hal::HIGH)?;
    m.add("PUD_OFF", hal::PUD_OFF)?;
    m.add("PUD_DOWN", hal::PUD_DOWN)?;
    m.add("PUD_UP", hal::PUD_UP)?;
    Ok(())
}

#[pymodule]
fn tinker_gpio(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let _ = env_logger::try_init();
    register(m)
}
