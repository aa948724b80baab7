//! SoC identification EEPROM.
//!
//! ```text
//!  page  contents (16 ASCII bytes)
//!  0     PUEORFSOC#######     SoC id
//!  1     MMDDYYYY000C00LS     crate C, side L, slot S
//!  3     MMDDYYYY########     bring-up halt state
//! ```
//!
//! A page whose first byte is 0xFF has never been programmed.  The
//! contents are read once at startup through the at24 sysfs file.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use log::warn;

use crate::app::ports::{Location, LocationPort};
use crate::fsm::StateId;

pub const PAGE_LEN: usize = 16;
const SOCID_PAGE: usize = 0;
const LOCATION_PAGE: usize = 1;
const STARTUP_PAGE: usize = 3;
const PAGES: usize = 5;

const SOCID_MAGIC: &[u8] = b"PUEORFSOC";
const BLANK: u8 = 0xFF;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EepromInfo {
    pub soc_id: Option<u8>,
    pub location: Option<Location>,
    pub startup: Option<StateId>,
}

impl EepromInfo {
    /// Read and parse the EEPROM.  An unreadable EEPROM is logged and
    /// treated as blank; the daemon must still come up.
    pub fn load(path: &Path) -> Self {
        match read_pages(path) {
            Ok(raw) => Self::parse(&raw),
            Err(e) => {
                warn!("EEPROM: {} unreadable ({}), treating as blank", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(raw: &[u8]) -> Self {
        Self {
            soc_id: page(raw, SOCID_PAGE).and_then(parse_soc_id),
            location: page(raw, LOCATION_PAGE).and_then(parse_location),
            startup: page(raw, STARTUP_PAGE).and_then(parse_startup),
        }
    }
}

impl LocationPort for EepromInfo {
    fn location(&self) -> Option<Location> {
        self.location
    }
}

fn read_pages(path: &Path) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(PAGES * PAGE_LEN);
    File::open(path)?
        .take((PAGES * PAGE_LEN) as u64)
        .read_to_end(&mut buf)?;
    Ok(buf)
}

fn page(raw: &[u8], n: usize) -> Option<&[u8]> {
    raw.get(n * PAGE_LEN..(n + 1) * PAGE_LEN)
}

fn ascii_number(bytes: &[u8]) -> Option<u32> {
    std::str::from_utf8(bytes).ok()?.trim().parse().ok()
}

fn parse_soc_id(p: &[u8]) -> Option<u8> {
    let digits = p.strip_prefix(SOCID_MAGIC)?;
    u8::try_from(ascii_number(digits)?).ok()
}

fn parse_location(p: &[u8]) -> Option<Location> {
    if p[0] == BLANK {
        return None;
    }
    Some(Location {
        crate_id: p[11],
        side: p[14],
        slot: p[15],
    })
}

fn parse_startup(p: &[u8]) -> Option<StateId> {
    if p[0] == BLANK {
        return None;
    }
    let n = u8::try_from(ascii_number(&p[8..])?).ok()?;
    StateId::from_u8(n).filter(|s| *s != StateId::Failure)
}
