//! Port traits: the boundary between daemon logic and the board.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ HskEngine / Bringup (domain)
//! ```
//!
//! Linux adapters in [`crate::adapters`] implement these against sysfs,
//! device nodes and subprocesses.  Tests implement them with recording
//! mocks, so nothing in `hsk` or `fsm` touches the filesystem directly.
//!
//! Port methods return `std::io::Result`.  Callers decide which failures
//! are command-level (reported in a reply) and which are fatal.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ───────────────────────────────────────────────────────────────
// Telemetry
// ───────────────────────────────────────────────────────────────

/// Raw SoC monitor readings, in ADC counts.
pub trait SensorPort {
    /// RPU and APU temperature channels.
    fn raw_temps(&mut self) -> io::Result<[u16; 2]>;

    /// PSINTLP, PSAUX, MGTRAVTT, MGTRAVCC, PSPLL, PSDDR.
    fn raw_volts(&mut self) -> io::Result<[u16; 6]>;
}

// ───────────────────────────────────────────────────────────────
// Identity and location
// ───────────────────────────────────────────────────────────────

pub trait IdentityPort {
    /// Device DNA as lowercase hex.
    fn dna(&self) -> io::Result<String>;

    /// Primary network interface MAC, colon separated.
    fn mac(&self) -> io::Result<String>;

    /// Root filesystem / platform version string.
    fn platform_version(&self) -> io::Result<String>;

    /// Daemon build version (major, minor, revision).
    fn build_version(&self) -> Option<(u8, u8, u8)>;
}

/// Where the board is installed, as programmed into its EEPROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Crate letter (ASCII).
    pub crate_id: u8,
    /// Slot side (ASCII 'L' or 'R').
    pub side: u8,
    /// Slot number (ASCII digit).
    pub slot: u8,
}

pub trait LocationPort {
    fn location(&self) -> Option<Location>;
}

// ───────────────────────────────────────────────────────────────
// Firmware slots
// ───────────────────────────────────────────────────────────────

/// Symlinks the boot scripts consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareSlot {
    /// Bitstream to load on next boot.
    NextFirmware,
    /// Software bundle to load on next boot.
    NextSoftware,
    /// Bitstream currently considered good.
    CurrentFirmware,
}

pub trait FirmwareStore {
    /// Link target, or `None` if the link does not exist.
    fn read_link(&self, slot: FirmwareSlot) -> io::Result<Option<PathBuf>>;

    /// Point `slot` at `target`, replacing any existing link atomically.
    /// Fails with `NotFound` if `target` is not an existing file.
    fn set_link(&mut self, slot: FirmwareSlot, target: &Path) -> io::Result<()>;

    /// Remove the link; a missing link is not an error.
    fn clear_link(&mut self, slot: FirmwareSlot) -> io::Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Subprocess-backed services
// ───────────────────────────────────────────────────────────────

pub trait JournalPort {
    /// Run a journal query and return its full output.  Must not block
    /// longer than `timeout`.
    fn query(&mut self, args: &[String], timeout: Duration) -> io::Result<Vec<u8>>;
}

/// Firmware ingest service started by download mode.
pub trait IngestService {
    fn start(&mut self) -> io::Result<()>;
    fn stop(&mut self) -> io::Result<()>;
    fn is_running(&mut self) -> io::Result<bool>;
}

// ───────────────────────────────────────────────────────────────
// Bring-up hardware
// ───────────────────────────────────────────────────────────────

/// Result of the eye scan: where to sample the incoming link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeCenter {
    pub delay: u32,
    pub offset: u32,
}

/// Firmware register space and link-training primitives.
pub trait BoardPort {
    fn read_reg(&mut self, addr: u32) -> io::Result<u32>;
    fn write_reg(&mut self, addr: u32, value: u32) -> io::Result<()>;

    /// Align the receive clock; returns the chosen phase.
    fn align_rxclk(&mut self) -> io::Result<u32>;
    /// Scan the incoming data eye.
    fn locate_eye(&mut self) -> io::Result<EyeCenter>;
    fn set_delay(&mut self, delay: u32) -> io::Result<()>;
    fn set_link_offset(&mut self, offset: u32) -> io::Result<()>;
    /// Ask the link partner to lock onto us.
    fn request_link_lock(&mut self) -> io::Result<()>;
    fn link_locked(&mut self) -> io::Result<bool>;
    fn set_training(&mut self, enable: bool) -> io::Result<()>;
    /// Link partner reports training complete.
    fn train_complete(&mut self) -> io::Result<bool>;
}

/// Sample-clock synthesiser.
pub trait ClockChip {
    /// Re-establish the control interface after a reset pulse.
    fn reinit(&mut self) -> io::Result<()>;
    /// Program the chip from a register dump file.
    fn configure(&mut self, path: &Path) -> io::Result<()>;
    /// Lock status byte; bit 1 is PLL2 lock.
    fn status(&mut self) -> io::Result<u8>;
}

// ───────────────────────────────────────────────────────────────
// Recording mocks
// ───────────────────────────────────────────────────────────────
