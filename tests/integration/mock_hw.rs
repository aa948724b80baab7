//! Mock adapters for integration tests.
//!
//! Every port is backed by one shared [`Platform`] record so tests can
//! poke at the "hardware" and assert on what the daemon did to it.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use surfhskd::app::ports::{
    BoardPort, ClockChip, EyeCenter, FirmwareSlot, FirmwareStore, IdentityPort, IngestService,
    JournalPort, Location, LocationPort, SensorPort,
};
use surfhskd::hsk::engine::Services;

// ── Platform services ─────────────────────────────────────────

#[derive(Debug)]
pub struct Platform {
    pub temps: [u16; 2],
    pub volts: [u16; 6],
    pub location: Option<Location>,
    pub links: HashMap<FirmwareSlot, PathBuf>,
    pub files: HashSet<PathBuf>,
    pub journal: Vec<u8>,
    pub journal_queries: Vec<Vec<String>>,
    pub ingest_running: bool,
    pub ingest_stops: u32,
}

impl Default for Platform {
    fn default() -> Self {
        Self {
            temps: [0x0A00, 0x0B00],
            volts: [10, 20, 30, 40, 50, 60],
            location: Some(Location {
                crate_id: b'B',
                side: b'R',
                slot: 2,
            }),
            links: HashMap::new(),
            files: HashSet::new(),
            journal: Vec::new(),
            journal_queries: Vec::new(),
            ingest_running: false,
            ingest_stops: 0,
        }
    }
}

#[derive(Clone, Default)]
pub struct MockPlatform(pub Rc<RefCell<Platform>>);

#[allow(dead_code)]
impl MockPlatform {
    pub fn services(&self) -> Services {
        Services {
            sensors: Box::new(self.clone()),
            identity: Box::new(self.clone()),
            location: Box::new(self.clone()),
            firmware: Box::new(self.clone()),
            journal: Box::new(self.clone()),
            ingest: Box::new(self.clone()),
        }
    }

    pub fn add_file(&self, path: &str) {
        self.0.borrow_mut().files.insert(PathBuf::from(path));
    }

    pub fn link(&self, slot: FirmwareSlot) -> Option<PathBuf> {
        self.0.borrow().links.get(&slot).cloned()
    }
}

impl SensorPort for MockPlatform {
    fn raw_temps(&mut self) -> io::Result<[u16; 2]> {
        Ok(self.0.borrow().temps)
    }
    fn raw_volts(&mut self) -> io::Result<[u16; 6]> {
        Ok(self.0.borrow().volts)
    }
}

impl IdentityPort for MockPlatform {
    fn dna(&self) -> io::Result<String> {
        Ok("400000000128a0c52c404085".into())
    }
    fn mac(&self) -> io::Result<String> {
        Ok("00:0a:35:00:01:22".into())
    }
    fn platform_version(&self) -> io::Result<String> {
        Ok("0.1.7".into())
    }
    fn build_version(&self) -> Option<(u8, u8, u8)> {
        Some((0, 3, 0))
    }
}

impl LocationPort for MockPlatform {
    fn location(&self) -> Option<Location> {
        self.0.borrow().location
    }
}

impl FirmwareStore for MockPlatform {
    fn read_link(&self, slot: FirmwareSlot) -> io::Result<Option<PathBuf>> {
        Ok(self.0.borrow().links.get(&slot).cloned())
    }
    fn set_link(&mut self, slot: FirmwareSlot, target: &Path) -> io::Result<()> {
        let mut p = self.0.borrow_mut();
        if !p.files.contains(target) {
            return Err(io::ErrorKind::NotFound.into());
        }
        p.links.insert(slot, target.to_path_buf());
        Ok(())
    }
    fn clear_link(&mut self, slot: FirmwareSlot) -> io::Result<()> {
        self.0.borrow_mut().links.remove(&slot);
        Ok(())
    }
}

impl JournalPort for MockPlatform {
    fn query(&mut self, args: &[String], _timeout: Duration) -> io::Result<Vec<u8>> {
        let mut p = self.0.borrow_mut();
        p.journal_queries.push(args.to_vec());
        Ok(p.journal.clone())
    }
}

impl IngestService for MockPlatform {
    fn start(&mut self) -> io::Result<()> {
        self.0.borrow_mut().ingest_running = true;
        Ok(())
    }
    fn stop(&mut self) -> io::Result<()> {
        let mut p = self.0.borrow_mut();
        p.ingest_running = false;
        p.ingest_stops += 1;
        Ok(())
    }
    fn is_running(&mut self) -> io::Result<bool> {
        Ok(self.0.borrow().ingest_running)
    }
}

// ── Bring-up hardware ─────────────────────────────────────────

/// Register file plus link flags, always ready unless told otherwise.
#[derive(Default)]
pub struct MockBoard {
    pub regs: HashMap<u32, u32>,
    pub link_locked: bool,
    pub trained: bool,
}

impl BoardPort for MockBoard {
    fn read_reg(&mut self, addr: u32) -> io::Result<u32> {
        Ok(self.regs.get(&addr).copied().unwrap_or(0))
    }
    fn write_reg(&mut self, addr: u32, value: u32) -> io::Result<()> {
        self.regs.insert(addr, value);
        Ok(())
    }
    fn align_rxclk(&mut self) -> io::Result<u32> {
        Ok(3)
    }
    fn locate_eye(&mut self) -> io::Result<EyeCenter> {
        Ok(EyeCenter {
            delay: 250,
            offset: 1,
        })
    }
    fn set_delay(&mut self, _delay: u32) -> io::Result<()> {
        Ok(())
    }
    fn set_link_offset(&mut self, _offset: u32) -> io::Result<()> {
        Ok(())
    }
    fn request_link_lock(&mut self) -> io::Result<()> {
        Ok(())
    }
    fn link_locked(&mut self) -> io::Result<bool> {
        Ok(self.link_locked)
    }
    fn set_training(&mut self, _enable: bool) -> io::Result<()> {
        Ok(())
    }
    fn train_complete(&mut self) -> io::Result<bool> {
        Ok(self.trained)
    }
}

/// Clock synthesiser that locks as soon as it is programmed.
#[derive(Default)]
pub struct MockClock {
    pub configured: bool,
}

impl ClockChip for MockClock {
    fn reinit(&mut self) -> io::Result<()> {
        Ok(())
    }
    fn configure(&mut self, _path: &Path) -> io::Result<()> {
        self.configured = true;
        Ok(())
    }
    fn status(&mut self) -> io::Result<u8> {
        Ok(if self.configured { 0x02 } else { 0 })
    }
}

/// Reset line that remembers every level it was driven to.
#[derive(Default)]
pub struct RecordingPin {
    pub levels: Vec<bool>,
}

impl embedded_hal::digital::ErrorType for RecordingPin {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for RecordingPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.levels.push(false);
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.levels.push(true);
        Ok(())
    }
}
