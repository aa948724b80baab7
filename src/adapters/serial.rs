//! UART link via `serialport`.

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use log::info;
use serialport::SerialPort;

use crate::error::TransportError;
use crate::hsk::transport::{Framing, Transport};

/// How long a read may block before reporting "nothing yet".
const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Open `device` at `baud`, 8N1, no flow control.
    pub fn open(device: &Path, baud: u32) -> Result<Self, TransportError> {
        let path = device.to_string_lossy();
        let port = serialport::new(path.as_ref(), baud)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;
        info!("SERIAL: opened {} at {} baud", path, baud);
        Ok(Self { port })
    }
}

impl Transport for SerialLink {
    fn framing(&self) -> Framing {
        Framing::Stream
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.port.flush()?;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError> {
        let port = self.port.try_clone()?;
        Ok(Box::new(Self { port }))
    }
}
