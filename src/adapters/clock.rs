//! LMK0461x sample-clock synthesiser over spidev.
//!
//! Every transaction is three bytes: a 15-bit register address (bit 7 of
//! the first byte set for reads) followed by one data byte.
//!
//! ```text
//!   write  [ hi      , lo , value ]
//!   read   [ 0x80|hi , lo , --    ]  ──▶  rx[2]
//! ```
//!
//! The register dump is a TICS export: one register per line, with the
//! 24-bit address+data word written as `0x......` somewhere on the line.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader};
use std::os::fd::AsRawFd;
use std::path::Path;
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::app::ports::ClockChip;

/// One full-duplex three-byte SPI transaction.
pub trait SpiBus {
    fn transfer(&mut self, tx: [u8; 3]) -> io::Result<[u8; 3]>;
}

// ── spidev ───────────────────────────────────────────────────

const SPI_IOC_WR_MODE: libc::c_ulong = 0x4001_6b01;
const SPI_IOC_WR_BITS_PER_WORD: libc::c_ulong = 0x4001_6b03;
const SPI_IOC_WR_MAX_SPEED_HZ: libc::c_ulong = 0x4004_6b04;
/// SPI_IOC_MESSAGE(1)
const SPI_IOC_MESSAGE_1: libc::c_ulong = 0x4020_6b00;

pub const SPI_SPEED_HZ: u32 = 500_000;

/// Kernel `struct spi_ioc_transfer`.
#[repr(C)]
#[derive(Default)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    pad: u8,
}

pub struct Spidev {
    file: File,
}

impl Spidev {
    /// Open in mode 0, 8 bits per word.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let dev = Self { file };
        dev.ioctl_write(SPI_IOC_WR_MODE, &0u8)?;
        dev.ioctl_write(SPI_IOC_WR_BITS_PER_WORD, &8u8)?;
        dev.ioctl_write(SPI_IOC_WR_MAX_SPEED_HZ, &SPI_SPEED_HZ)?;
        debug!("CLOCK: opened {} at {} Hz", path.display(), SPI_SPEED_HZ);
        Ok(dev)
    }

    fn ioctl_write<T>(&self, req: libc::c_ulong, val: &T) -> io::Result<()> {
        // SAFETY: `val` is a live value of the size the request encodes.
        let r = unsafe { libc::ioctl(self.file.as_raw_fd(), req as _, val as *const T) };
        if r < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl SpiBus for Spidev {
    fn transfer(&mut self, tx: [u8; 3]) -> io::Result<[u8; 3]> {
        let mut rx = [0u8; 3];
        let xfer = SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.as_mut_ptr() as u64,
            len: tx.len() as u32,
            speed_hz: SPI_SPEED_HZ,
            bits_per_word: 8,
            ..Default::default()
        };
        self.ioctl_write(SPI_IOC_MESSAGE_1, &xfer)?;
        Ok(rx)
    }
}

// ── LMK0461x ─────────────────────────────────────────────────

pub mod reg {
    /// Writing 1 resets the register file.
    pub const RESET: u16 = 0x0011;
    pub const PLL1_CTRL: u16 = 0x0085;
    pub const SYNC: u16 = 0x00AD;
    pub const OUTPUT_CTRL: u16 = 0x00F6;
    pub const STATUS: u16 = 0x00BE;
    pub const SPI_CTRL0: u16 = 0x0141;
    pub const SPI_CTRL1: u16 = 0x0142;
}

/// Delay between raising and dropping SYNC.
const SYNC_PULSE: Duration = Duration::from_millis(20);

pub struct Lmk0461x<S> {
    bus: S,
}

impl<S: SpiBus> Lmk0461x<S> {
    pub fn new(bus: S) -> Self {
        Self { bus }
    }

    pub fn write(&mut self, addr: u16, value: u8) -> io::Result<()> {
        let [hi, lo] = (addr & 0x7FFF).to_be_bytes();
        self.bus.transfer([hi, lo, value]).map(|_| ())
    }

    pub fn read(&mut self, addr: u16) -> io::Result<u8> {
        let [hi, lo] = (addr & 0x7FFF).to_be_bytes();
        Ok(self.bus.transfer([0x80 | hi, lo, 0])?[2])
    }

    pub fn into_inner(self) -> S {
        self.bus
    }
}

/// Pull the `0x......` word out of one dump line.
fn parse_dump_line(line: &str) -> Option<io::Result<[u8; 3]>> {
    let start = line.find("0x")? + 2;
    let hex: String = line[start..]
        .chars()
        .take_while(char::is_ascii_hexdigit)
        .collect();
    Some(
        u32::from_str_radix(&hex, 16)
            .ok()
            .filter(|w| *w <= 0x00FF_FFFF)
            .map(|w| {
                let [_, a, b, c] = w.to_be_bytes();
                [a, b, c]
            })
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("bad register word in {:?}", line.trim()),
                )
            }),
    )
}

impl<S: SpiBus> ClockChip for Lmk0461x<S> {
    fn reinit(&mut self) -> io::Result<()> {
        // 4-wire SPI with readback on the SDO pin.
        self.write(reg::SPI_CTRL0, 0x04)?;
        self.write(reg::SPI_CTRL1, 0x30)
    }

    fn configure(&mut self, path: &Path) -> io::Result<()> {
        let words = BufReader::new(File::open(path)?)
            .lines()
            .filter_map(|line| match line {
                Ok(l) => parse_dump_line(&l),
                Err(e) => Some(Err(e)),
            })
            .collect::<io::Result<Vec<_>>>()?;

        self.write(reg::RESET, 0x00)?;
        for w in &words {
            self.bus.transfer(*w)?;
        }
        self.write(reg::PLL1_CTRL, 0x00)?;
        self.write(reg::OUTPUT_CTRL, 0x02)?;
        self.write(reg::RESET, 0x01)?;
        self.write(reg::SYNC, 0x30)?;
        thread::sleep(SYNC_PULSE);
        self.write(reg::SYNC, 0x00)?;
        info!("CLOCK: loaded {} registers from {}", words.len(), path.display());
        Ok(())
    }

    fn status(&mut self) -> io::Result<u8> {
        self.read(reg::STATUS)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    /// Records writes; answers reads with `answer`.
    #[derive(Default)]
    struct Recorder {
        sent: Vec<[u8; 3]>,
        answer: u8,
    }

    impl SpiBus for Recorder {
        fn transfer(&mut self, tx: [u8; 3]) -> io::Result<[u8; 3]> {
            self.sent.push(tx);
            Ok([0, 0, self.answer])
        }
    }

    #[test]
    fn ioc_transfer_matches_kernel_layout() {
        assert_eq!(std::mem::size_of::<SpiIocTransfer>(), 32);
    }

    #[test]
    fn status_reads_register_be() {
        let mut lmk = Lmk0461x::new(Recorder {
            answer: 0x02,
            ..Default::default()
        });
        assert_eq!(lmk.status().unwrap(), 0x02);
        assert_eq!(lmk.into_inner().sent, vec![[0x80, 0xBE, 0x00]]);
    }

    #[test]
    fn reinit_sets_spi_mode() {
        let mut lmk = Lmk0461x::new(Recorder::default());
        lmk.reinit().unwrap();
        assert_eq!(
            lmk.into_inner().sent,
            vec![[0x01, 0x41, 0x04], [0x01, 0x42, 0x30]]
        );
    }

    #[test]
    fn configure_wraps_dump_in_reset_and_sync() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "R0 (INIT)\t0x000010").unwrap();
        writeln!(f, "# comment").unwrap();
        writeln!(f, "R20\t0x001418").unwrap();
        writeln!(f).unwrap();

        let mut lmk = Lmk0461x::new(Recorder::default());
        lmk.configure(f.path()).unwrap();
        assert_eq!(
            lmk.into_inner().sent,
            vec![
                [0x00, 0x11, 0x00],
                [0x00, 0x00, 0x10],
                [0x00, 0x14, 0x18],
                [0x00, 0x85, 0x00],
                [0x00, 0xF6, 0x02],
                [0x00, 0x11, 0x01],
                [0x00, 0xAD, 0x30],
                [0x00, 0xAD, 0x00],
            ]
        );
    }

    #[test]
    fn malformed_dump_sends_nothing() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "R0\t0x000010").unwrap();
        writeln!(f, "R1\t0xZZ").unwrap();

        let mut lmk = Lmk0461x::new(Recorder::default());
        let err = lmk.configure(f.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(lmk.into_inner().sent.is_empty());
    }

    #[test]
    fn oversized_word_is_rejected() {
        assert!(parse_dump_line("R9 0x1000000").unwrap().is_err());
        assert!(parse_dump_line("no word here").is_none());
    }
}
