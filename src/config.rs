use std::env;
use std::path::PathBuf;

use crate::gpio::{GpioMem, DEFAULT_DEVICE};
use crate::hal::{GpioBackend, GpioError};
use crate::mock::MockGpio;

pub const BACKEND_VAR: &str = "TINKER_GPIO_BACKEND";
pub const DEVICE_VAR: &str = "TINKER_GPIO_DEVICE";

/// `GpioMem` drives Broadcom registers only; boards such as the Tinker Board
/// need `WiringPi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    GpioMem,
    #[cfg(feature = "wiringpi")]
    WiringPi,
    Mock,
}

impl BackendKind {
    pub fn parse(name: &str) -> Result<Self, GpioError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gpiomem" => Ok(BackendKind::GpioMem),
            #[cfg(feature = "wiringpi")]
            "wiringpi" => Ok(BackendKind::WiringPi),
            "mock" => Ok(BackendKind::Mock),
            _ => Err(GpioError::UnknownBackend(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: BackendKind,
    pub device: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config { backend: BackendKind::default(), device: PathBuf::from(DEFAULT_DEVICE) }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, GpioError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GpioError> {
        let mut config = Config::default();
        if let Some(name) = lookup(BACKEND_VAR).filter(|s| !s.is_empty()) {
            config.backend = BackendKind::parse(&name)?;
        }
        if let Some(device) = lookup(DEVICE_VAR).filter(|s| !s.is_empty()) {
            config.device = PathBuf::from(device);
        }
        Ok(config)
    }

    pub fn build_backend(&self) -> Box<dyn GpioBackend> {
        match self.backend {
            BackendKind::GpioMem => Box::new(GpioMem::with_device(&self.device)),
            #[cfg(feature = "wiringpi")]
            BackendKind::WiringPi => Box::new(crate::wiringpi::WiringPi),
            BackendKind::Mock => Box::new(MockGpio::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_gpiomem() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.device, PathBuf::from("/dev/gpiomem"));
    }

    #[test]
    fn reads_backend_and_device() {
        let config = Config::from_lookup(lookup(&[
            (BACKEND_VAR, " Mock "),
            (DEVICE_VAR, "/tmp/gpiomem"),
        ]))
        .unwrap();
        assert_eq!(config.backend, BackendKind::Mock);
        assert_eq!(config.device, PathBuf::from("/tmp/gpiomem"));
    }

    #[test]
    fn empty_values_keep_defaults() {
        let config = Config::from_lookup(lookup(&[(BACKEND_VAR, ""), (DEVICE_VAR, "")])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = Config::from_lookup(lookup(&[(BACKEND_VAR, "sysfs")])).unwrap_err();
        assert!(matches!(err, GpioError::UnknownBackend(name) if name == "sysfs"));
    }

    #[cfg(not(feature = "wiringpi"))]
    #[test]
    fn wiringpi_needs_feature() {
        assert!(BackendKind::parse("wiringpi").is_err());
    }
}
