//! Housekeeping packet model, opcodes and the additive checksum.
//!
//! ```text
//! ┌──────┬──────┬──────┬──────┬──────────────┬──────────┐
//! │ src  │ dest │ cmd  │ len  │ data[len]    │ checksum │
//! │ 1B   │ 1B   │ 1B   │ 1B   │ 0..=255 B    │ 1B       │
//! └──────┴──────┴──────┴──────┴──────────────┴──────────┘
//! ```
//!
//! The checksum covers `data` only: `data ++ [checksum]` sums to zero
//! modulo 256.  Header bytes are protected by addressing alone.

use heapless::Vec;

/// Largest data section a packet can carry (length is one byte).
pub const MAX_DATA: usize = 255;

/// Header bytes before the data section.
pub const HEADER_LEN: usize = 4;

/// Smallest well-formed unstuffed frame: header plus checksum.
pub const MIN_FRAME: usize = HEADER_LEN + 1;

/// Largest unstuffed frame.
pub const MAX_FRAME: usize = HEADER_LEN + MAX_DATA + 1;

/// Fixed-capacity packet payload.
pub type Payload = Vec<u8, MAX_DATA>;

// ── Opcodes ──────────────────────────────────────────────────

pub mod opcode {
    pub const PING: u8 = 0x00;
    pub const STATISTICS: u8 = 0x0F;
    pub const TEMPS: u8 = 0x10;
    pub const VOLTS: u8 = 0x11;
    pub const IDENTIFY: u8 = 0x12;
    pub const START_STATE: u8 = 0x20;
    /// Reserved; no handler is registered.
    pub const FW_PARAMS: u8 = 0x80;
    pub const FW_NEXT: u8 = 0x81;
    pub const SOFT_NEXT: u8 = 0x87;
    pub const SOFT_NEXT_REBOOT: u8 = 0x88;
    pub const JOURNAL: u8 = 0xBD;
    pub const DOWNLOAD_MODE: u8 = 0xBE;
    pub const RESTART: u8 = 0xBF;
    /// Reply opcode for command-level failures.
    pub const ERROR: u8 = 0xFF;
}

// ── Addresses ────────────────────────────────────────────────

pub mod addr {
    /// Operator console / ground software.
    pub const CONSOLE: u8 = 0xFE;
    /// Crate coordinator.
    pub const COORDINATOR: u8 = 0x60;
    /// Class-A (link interface) boards.
    pub const LINK_BOARDS: [u8; 4] = [0x40, 0x48, 0x50, 0x58];
    /// Class-B digitizer boards are `DIGITIZER_BASE + soc_id`.
    pub const DIGITIZER_BASE: u8 = 0x80;
    /// Largest SoC id whose address stays clear of `CONSOLE`.
    pub const MAX_SOC_ID: u8 = CONSOLE - DIGITIZER_BASE - 1;

    /// Address a digitizer board answers to, given its SoC id.
    pub const fn digitizer(soc_id: u8) -> u8 {
        DIGITIZER_BASE.wrapping_add(soc_id)
    }
}

// ── Packet ───────────────────────────────────────────────────

/// A decoded, addressed housekeeping packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub src: u8,
    pub dest: u8,
    pub cmd: u8,
    pub data: Payload,
}

impl Packet {
    /// Build a packet, or `None` if `data` exceeds [`MAX_DATA`].
    pub fn new(src: u8, dest: u8, cmd: u8, data: &[u8]) -> Option<Self> {
        Some(Self {
            src,
            dest,
            cmd,
            data: Vec::from_slice(data).ok()?,
        })
    }

    /// Packet with an empty data section.
    pub fn empty(src: u8, dest: u8, cmd: u8) -> Self {
        Self {
            src,
            dest,
            cmd,
            data: Vec::new(),
        }
    }

    /// Reply addressed back to this packet's sender.
    pub fn reply(&self, my_id: u8, cmd: u8, data: Payload) -> Self {
        Self {
            src: my_id,
            dest: self.src,
            cmd,
            data,
        }
    }

    /// Checksum byte that goes on the wire for this packet.
    pub fn checksum(&self) -> u8 {
        checksum(&self.data)
    }
}

/// Subtractive checksum: the value that brings `sum(data)` to zero mod 256.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
        .wrapping_neg()
}
