//! Output line through the sysfs GPIO interface.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use embedded_hal::digital::{self, ErrorKind, ErrorType, OutputPin};
use log::debug;

#[derive(Debug)]
pub struct GpioError(pub io::Error);

impl digital::Error for GpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

pub struct SysfsPin {
    value: PathBuf,
}

impl SysfsPin {
    /// Export `number` under `root` (normally `/sys/class/gpio`) and make
    /// it an output, initially low.
    pub fn export(root: &Path, number: u32) -> io::Result<Self> {
        let dir = root.join(format!("gpio{number}"));
        if !dir.exists() {
            fs::write(root.join("export"), number.to_string())?;
        }
        // "low" sets direction and level in one write, with no glitch.
        fs::write(dir.join("direction"), "low")?;
        debug!("GPIO: {} exported as output", number);
        Ok(Self {
            value: dir.join("value"),
        })
    }

    fn set(&mut self, high: bool) -> Result<(), GpioError> {
        fs::write(&self.value, if high { "1" } else { "0" }).map_err(GpioError)
    }
}

impl ErrorType for SysfsPin {
    type Error = GpioError;
}

impl OutputPin for SysfsPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set(true)
    }
}
