//! Shared context threaded through every bring-up state function.
//!
//! `BringupContext` owns the hardware handles the sequence drives (board
//! register space, clock synthesiser, clock reset line) and records what
//! earlier steps learned so later ones and the logs can refer to it.

use std::io;
use std::path::PathBuf;

use anyhow::anyhow;
use embedded_hal::digital::{Error as _, OutputPin};

use crate::app::ports::{BoardPort, ClockChip, EyeCenter};

// ---------------------------------------------------------------------------
// Register map
// ---------------------------------------------------------------------------

pub mod regs {
    /// Firmware identification word.
    pub const ID: u32 = 0x000;
    /// Build date/version word.
    pub const DATE_VERSION: u32 = 0x004;
    /// Clock control: bit 31 rack clock ready, bit 0 sample-clock enable.
    pub const CLOCK_CTRL: u32 = 0x00C;
    pub const RACKCLK_READY_BIT: u32 = 31;
    pub const ACLK_ENABLE_BIT: u32 = 0;
    /// PLL control: bit 13 reset, bit 14 locked.
    pub const PLL_CTRL: u32 = 0x800;
    pub const PLL_RESET_BIT: u32 = 13;
    pub const PLL_LOCKED_BIT: u32 = 14;

    /// "SURF" in big-endian ASCII.
    pub const BOARD_ID: u32 = u32::from_be_bytes(*b"SURF");
}

/// Clock synthesiser status bit: PLL2 lock detect.
pub const CLOCK_LOCKED: u8 = 0x02;

// ---------------------------------------------------------------------------
// BringupContext
// ---------------------------------------------------------------------------

pub struct BringupContext<B, K, P> {
    pub board: B,
    pub clock: K,
    /// Active-high reset line of the clock synthesiser.
    pub clock_reset: P,
    /// Register dump programmed into the clock synthesiser.
    pub clock_config: PathBuf,

    /// Firmware build word read during identification.
    pub date_version: Option<u32>,
    /// Phase chosen by receive-clock alignment.
    pub rxclk_phase: Option<u32>,
    /// Eye center applied to the incoming link.
    pub eye: Option<EyeCenter>,
}

impl<B, K, P> BringupContext<B, K, P>
where
    B: BoardPort,
    K: ClockChip,
    P: OutputPin,
{
    pub fn new(board: B, clock: K, clock_reset: P, clock_config: PathBuf) -> Self {
        Self {
            board,
            clock,
            clock_reset,
            clock_config,
            date_version: None,
            rxclk_phase: None,
            eye: None,
        }
    }

    /// Read one bit of a register.
    pub fn reg_bit(&mut self, addr: u32, bit: u32) -> io::Result<bool> {
        Ok(self.board.read_reg(addr)? & (1 << bit) != 0)
    }

    /// Read-modify-write one bit of a register.
    pub fn set_reg_bit(&mut self, addr: u32, bit: u32, on: bool) -> io::Result<()> {
        let v = self.board.read_reg(addr)?;
        let v = if on { v | (1 << bit) } else { v & !(1 << bit) };
        self.board.write_reg(addr, v)
    }

    /// Drive the clock reset line.
    pub fn clock_reset(&mut self, asserted: bool) -> anyhow::Result<()> {
        let r = if asserted {
            self.clock_reset.set_high()
        } else {
            self.clock_reset.set_low()
        };
        r.map_err(|e| anyhow!("clock reset line: {:?}", e.kind()))
    }
}
