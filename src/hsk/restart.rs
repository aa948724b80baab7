//! Restart codes handed back to the supervising service as the exit code.
//!
//! ```text
//!   0x00..=0x0F   bitmask   0x01 keep current software
//!                           0x02 revert changes
//!                           0x04 cleanup
//!                           0x08 force reprogram
//!   0xFE          terminate without unmounting
//!   0xFF          reboot the SoC
//! ```
//!
//! Anything else (bit 0x80 set on a non-magic value, or undefined low
//! bits) is refused.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartCode(u8);

impl RestartCode {
    pub const KEEP_CURRENT: u8 = 0x01;
    pub const REVERT: u8 = 0x02;
    pub const CLEANUP: u8 = 0x04;
    pub const FORCE_REPROGRAM: u8 = 0x08;
    pub const TERMINATE: u8 = 0xFE;
    pub const REBOOT: u8 = 0xFF;

    const FLAGS: u8 = Self::KEEP_CURRENT | Self::REVERT | Self::CLEANUP | Self::FORCE_REPROGRAM;

    /// Plain restart, nothing special on the way back up.
    pub const NORMAL: Self = Self(0);

    /// Validate a requested code.
    pub fn parse(code: u8) -> Option<Self> {
        match code {
            Self::TERMINATE | Self::REBOOT => Some(Self(code)),
            c if c & !Self::FLAGS == 0 => Some(Self(c)),
            _ => None,
        }
    }

    pub fn is_magic(self) -> bool {
        matches!(self.0, Self::TERMINATE | Self::REBOOT)
    }

    /// The bitstream currently marked good must be discarded.
    pub fn force_reprogram(self) -> bool {
        !self.is_magic() && self.0 & Self::FORCE_REPROGRAM != 0
    }

    /// Process exit status that carries this code.
    pub fn exit_code(self) -> u8 {
        self.0
    }
}

impl fmt::Display for RestartCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Self::TERMINATE => f.write_str("terminate"),
            Self::REBOOT => f.write_str("reboot"),
            c => {
                write!(f, "restart {:#04x}", c)?;
                for (bit, name) in [
                    (Self::KEEP_CURRENT, "keep"),
                    (Self::REVERT, "revert"),
                    (Self::CLEANUP, "cleanup"),
                    (Self::FORCE_REPROGRAM, "reprogram"),
                ] {
                    if c & bit != 0 {
                        write!(f, " +{}", name)?;
                    }
                }
                Ok(())
            }
        }
    }
}
