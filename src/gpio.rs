use libc::{close, mmap, munmap, open, MAP_SHARED, O_RDWR, PROT_READ, PROT_WRITE};
use log::{debug, warn};
use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::thread::sleep;
use std::time::Duration;

use crate::hal::{GpioBackend, GpioError, INPUT, OUTPUT, PUD_DOWN, PUD_UP};

pub const DEFAULT_DEVICE: &str = "/dev/gpiomem";
const DEVICE_TREE_COMPATIBLE: &str = "/proc/device-tree/compatible";

const GPIO_LEN: usize = 0xF4;
const GPIO_WORDS: usize = GPIO_LEN / 4;
const MAX_PIN: i32 = 53;

const GPSET0: usize = 7;
const GPCLR0: usize = 10;
const GPLEV0: usize = 13;
const GPPUD: usize = 37;
const GPPUDCLK0: usize = 38;
const GPIO_PUP_PDN_CNTRL0: usize = 57;

// At least 150 core cycles between the GPPUD steps.
const PUD_SETTLE: Duration = Duration::from_micros(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Soc {
    /// BCM2835/6/7: clocked GPPUD pull sequence.
    Bcm2835,
    /// BCM2711: 2-bit GPIO_PUP_PDN_CNTRL fields.
    Bcm2711,
}

/// Reads the NUL-separated device-tree `compatible` list. Boards without one
/// are treated as BCM2835-family.
fn detect_soc(path: &Path) -> Result<Soc, GpioError> {
    let compatible = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("cannot read {}: {e}, assuming BCM2835 registers", path.display());
            return Ok(Soc::Bcm2835);
        }
    };
    for entry in compatible.split(|&b| b == 0).map(String::from_utf8_lossy) {
        match entry.as_ref() {
            "brcm,bcm2711" => return Ok(Soc::Bcm2711),
            // Pi 5 GPIO sits behind the RP1, not in this register block
            "brcm,bcm2712" => return Err(GpioError::UnsupportedSoc(entry.to_string())),
            _ => {}
        }
    }
    Ok(Soc::Bcm2835)
}

enum Registers {
    Mapped(NonNull<u32>),
    #[cfg(test)]
    Heap(Box<[u32; GPIO_WORDS]>),
}

impl Registers {
    fn base(&mut self) -> *mut u32 {
        match self {
            Registers::Mapped(p) => p.as_ptr(),
            #[cfg(test)]
            Registers::Heap(words) => words.as_mut_ptr(),
        }
    }
}

/// BCM283x/BCM2711 GPIO block mapped from `/dev/gpiomem`. Pins use BCM
/// numbering. Other SoCs (Tinker Board's RK3288, Pi 5) need the `wiringpi`
/// backend.
pub struct GpioMem {
    device: PathBuf,
    compatible: PathBuf,
    soc: Soc,
    regs: Option<Registers>,
}

impl GpioMem {
    pub fn new() -> Self {
        Self::with_device(DEFAULT_DEVICE)
    }

    pub fn with_device(device: impl AsRef<Path>) -> Self {
        GpioMem {
            device: device.as_ref().to_path_buf(),
            compatible: PathBuf::from(DEVICE_TREE_COMPATIBLE),
            soc: Soc::Bcm2835,
            regs: None,
        }
    }

    #[cfg(test)]
    fn in_memory(soc: Soc) -> Self {
        GpioMem {
            device: PathBuf::from("<heap>"),
            compatible: PathBuf::new(),
            soc,
            regs: Some(Registers::Heap(Box::new([0; GPIO_WORDS]))),
        }
    }

    fn map(&self) -> Result<NonNull<u32>, GpioError> {
        let open_err = |source| GpioError::Open { path: self.device.clone(), source };
        let cpath = CString::new(self.device.as_os_str().as_bytes())
            .map_err(|e| open_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let fd = unsafe { open(cpath.as_ptr(), O_RDWR) };
        if fd < 0 {
            return Err(open_err(io::Error::last_os_error()));
        }
        let map = unsafe {
            mmap(ptr::null_mut(), GPIO_LEN, PROT_READ | PROT_WRITE, MAP_SHARED, fd, 0)
        };
        let map_err = io::Error::last_os_error();
        unsafe { close(fd) };
        if map == libc::MAP_FAILED {
            return Err(GpioError::Map(map_err));
        }
        NonNull::new(map as *mut u32).ok_or(GpioError::Map(map_err))
    }

    fn reg(&mut self, idx: usize) -> Option<*mut u32> {
        debug_assert!(idx < GPIO_WORDS);
        self.regs.as_mut().map(|r| unsafe { r.base().add(idx) })
    }

    fn read_reg(&mut self, idx: usize) -> u32 {
        match self.reg(idx) {
            Some(reg) => unsafe { ptr::read_volatile(reg) },
            None => 0,
        }
    }

    fn write_reg(&mut self, idx: usize, val: u32) {
        if let Some(reg) = self.reg(idx) {
            unsafe { ptr::write_volatile(reg, val) };
        }
    }
}

impl Default for GpioMem {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GpioMem {
    fn drop(&mut self) {
        if let Some(Registers::Mapped(p)) = self.regs.take() {
            unsafe { munmap(p.as_ptr() as *mut _, GPIO_LEN) };
        }
    }
}

fn bcm_pin(pin: i32) -> Option<usize> {
    if (0..=MAX_PIN).contains(&pin) {
        Some(pin as usize)
    } else {
        warn!("ignoring out-of-range GPIO pin {pin}");
        None
    }
}

impl GpioBackend for GpioMem {
    fn setup(&mut self) -> Result<(), GpioError> {
        if self.regs.is_none() {
            self.soc = detect_soc(&self.compatible)?;
            self.regs = Some(Registers::Mapped(self.map()?));
            debug!("mapped {:?} GPIO registers from {}", self.soc, self.device.display());
        }
        Ok(())
    }

    fn pin_mode(&mut self, pin: i32, mode: i32) {
        let Some(pin) = bcm_pin(pin) else { return };
        let bits = match mode {
            INPUT => 0b000,
            OUTPUT => 0b001,
            other => {
                warn!("unsupported mode {other} for pin {pin}");
                return;
            }
        };
        let fsel = pin / 10;
        let shift = (pin % 10) * 3;
        let val = self.read_reg(fsel);
        let mask = !(0b111 << shift);
        self.write_reg(fsel, (val & mask) | (bits << shift));
    }

    fn digital_read(&mut self, pin: i32) -> i32 {
        let Some(pin) = bcm_pin(pin) else { return 0 };
        let val = self.read_reg(GPLEV0 + pin / 32);
        ((val >> (pin % 32)) & 1) as i32
    }

    fn digital_write(&mut self, pin: i32, value: i32) {
        let Some(pin) = bcm_pin(pin) else { return };
        let idx = (if value == 0 { GPCLR0 } else { GPSET0 }) + pin / 32;
        self.write_reg(idx, 1 << (pin % 32));
    }

    fn pull_up_dn_control(&mut self, pin: i32, pud: i32) {
        let Some(pin) = bcm_pin(pin) else { return };
        if !(0..=PUD_UP).contains(&pud) {
            warn!("unsupported pull mode {pud} for pin {pin}");
            return;
        }
        match self.soc {
            Soc::Bcm2835 => {
                let clk = GPPUDCLK0 + pin / 32;
                self.write_reg(GPPUD, pud as u32);
                sleep(PUD_SETTLE);
                self.write_reg(clk, 1 << (pin % 32));
                sleep(PUD_SETTLE);
                self.write_reg(GPPUD, 0);
                self.write_reg(clk, 0);
            }
            Soc::Bcm2711 => {
                // up and down are swapped relative to PUD_*
                let bits: u32 = match pud {
                    PUD_UP => 0b01,
                    PUD_DOWN => 0b10,
                    _ => 0b00,
                };
                let idx = GPIO_PUP_PDN_CNTRL0 + pin / 16;
                let shift = (pin % 16) * 2;
                let val = self.read_reg(idx);
                self.write_reg(idx, (val & !(0b11 << shift)) | (bits << shift));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{HIGH, LOW, PUD_OFF};

    fn words(gpio: &mut GpioMem) -> [u32; GPIO_WORDS] {
        let mut out = [0; GPIO_WORDS];
        for (i, w) in out.iter_mut().enumerate() {
            *w = gpio.read_reg(i);
        }
        out
    }

    #[test]
    fn pin_mode_sets_function_select_bits() {
        let mut gpio = GpioMem::in_memory(Soc::Bcm2835);
        gpio.write_reg(1, 0xFFFF_FFFF);
        gpio.pin_mode(17, OUTPUT);
        // pin 17 lives in GPFSEL1 at bits 21..24
        assert_eq!((gpio.read_reg(1) >> 21) & 0b111, 0b001);

        gpio.pin_mode(17, INPUT);
        assert_eq!((gpio.read_reg(1) >> 21) & 0b111, 0b000);
        assert_eq!(gpio.read_reg(1) | (0b111 << 21), 0xFFFF_FFFF);
    }

    #[test]
    fn unsupported_mode_leaves_registers_alone() {
        let mut gpio = GpioMem::in_memory(Soc::Bcm2835);
        gpio.pin_mode(4, 7);
        assert!(words(&mut gpio).iter().all(|&w| w == 0));
    }

    #[test]
    fn write_uses_set_and_clear_registers() {
        let mut gpio = GpioMem::in_memory(Soc::Bcm2835);
        gpio.digital_write(5, HIGH);
        assert_eq!(gpio.read_reg(GPSET0), 1 << 5);
        gpio.digital_write(40, LOW);
        assert_eq!(gpio.read_reg(GPCLR0 + 1), 1 << 8);
    }

    #[test]
    fn read_reports_level_bit() {
        let mut gpio = GpioMem::in_memory(Soc::Bcm2835);
        gpio.write_reg(GPLEV0, 1 << 3);
        gpio.write_reg(GPLEV0 + 1, 1 << 2);
        assert_eq!(gpio.digital_read(3), 1);
        assert_eq!(gpio.digital_read(4), 0);
        assert_eq!(gpio.digital_read(34), 1);
    }

    #[test]
    fn pull_sequence_ends_cleared() {
        let mut gpio = GpioMem::in_memory(Soc::Bcm2835);
        gpio.pull_up_dn_control(22, PUD_DOWN);
        assert_eq!(gpio.read_reg(GPPUD), 0);
        assert_eq!(gpio.read_reg(GPPUDCLK0), 0);
    }

    #[test]
    fn bcm2711_pull_writes_pup_pdn_fields() {
        let mut gpio = GpioMem::in_memory(Soc::Bcm2711);
        gpio.pull_up_dn_control(4, PUD_UP);
        assert_eq!(gpio.read_reg(GPIO_PUP_PDN_CNTRL0), 0b01 << 8);

        gpio.pull_up_dn_control(4, PUD_DOWN);
        assert_eq!(gpio.read_reg(GPIO_PUP_PDN_CNTRL0), 0b10 << 8);

        // pin 17 is field 1 of the second register
        gpio.pull_up_dn_control(17, PUD_UP);
        assert_eq!(gpio.read_reg(GPIO_PUP_PDN_CNTRL0 + 1), 0b01 << 2);

        gpio.pull_up_dn_control(4, PUD_OFF);
        assert_eq!(gpio.read_reg(GPIO_PUP_PDN_CNTRL0), 0);
        assert_eq!(gpio.read_reg(GPPUD), 0);
    }

    #[test]
    fn detects_soc_from_device_tree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compatible");

        fs::write(&path, b"raspberrypi,4-model-b\0brcm,bcm2711\0").unwrap();
        assert_eq!(detect_soc(&path).unwrap(), Soc::Bcm2711);

        fs::write(&path, b"raspberrypi,3-model-b\0brcm,bcm2837\0").unwrap();
        assert_eq!(detect_soc(&path).unwrap(), Soc::Bcm2835);

        assert_eq!(detect_soc(&dir.path().join("missing")).unwrap(), Soc::Bcm2835);
    }

    #[test]
    fn setup_refuses_bcm2712() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compatible");
        fs::write(&path, b"raspberrypi,5-model-b\0brcm,bcm2712\0").unwrap();

        let mut gpio = GpioMem::with_device("/nonexistent/gpiomem");
        gpio.compatible = path;
        let err = gpio.setup().unwrap_err();
        assert!(matches!(err, GpioError::UnsupportedSoc(ref soc) if soc == "brcm,bcm2712"));
        assert!(gpio.regs.is_none());
    }

    #[test]
    fn out_of_range_pins_are_ignored() {
        let mut gpio = GpioMem::in_memory(Soc::Bcm2835);
        gpio.digital_write(54, HIGH);
        gpio.digital_write(-1, HIGH);
        gpio.pin_mode(99, OUTPUT);
        assert_eq!(gpio.digital_read(60), 0);
        assert!(words(&mut gpio).iter().all(|&w| w == 0));
    }

    #[test]
    fn setup_reports_missing_device() {
        let mut gpio = GpioMem::with_device("/nonexistent/gpiomem");
        gpio.compatible = PathBuf::from("/nonexistent/compatible");
        let err = gpio.setup().unwrap_err();
        assert!(matches!(err, GpioError::Open { .. }));
        assert_eq!(err.code(), libc::ENOENT);
    }

    #[test]
    fn unmapped_backend_is_inert() {
        let mut gpio = GpioMem::new();
        gpio.digital_write(5, HIGH);
        assert_eq!(gpio.digital_read(5), 0);
    }
}
