//! Next-boot pointers kept as symlinks, consulted by the boot scripts.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use crate::app::ports::{FirmwareSlot, FirmwareStore};

pub struct SymlinkStore {
    next_firmware: PathBuf,
    next_software: PathBuf,
    current_firmware: PathBuf,
}

impl SymlinkStore {
    pub fn new(next_firmware: PathBuf, next_software: PathBuf, current_firmware: PathBuf) -> Self {
        Self {
            next_firmware,
            next_software,
            current_firmware,
        }
    }

    fn link(&self, slot: FirmwareSlot) -> &Path {
        match slot {
            FirmwareSlot::NextFirmware => &self.next_firmware,
            FirmwareSlot::NextSoftware => &self.next_software,
            FirmwareSlot::CurrentFirmware => &self.current_firmware,
        }
    }
}

fn ignore_missing(r: io::Result<()>) -> io::Result<()> {
    match r {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        r => r,
    }
}

impl FirmwareStore for SymlinkStore {
    fn read_link(&self, slot: FirmwareSlot) -> io::Result<Option<PathBuf>> {
        match fs::read_link(self.link(slot)) {
            Ok(t) => Ok(Some(t)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The new link is built beside the old one and renamed over it, so
    /// a reader never sees the slot missing.
    fn set_link(&mut self, slot: FirmwareSlot, target: &Path) -> io::Result<()> {
        if !target.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a file", target.display()),
            ));
        }
        let link = self.link(slot);
        let mut tmp = OsString::from(link.as_os_str());
        tmp.push(".new");
        let tmp = PathBuf::from(tmp);

        ignore_missing(fs::remove_file(&tmp))?;
        symlink(target, &tmp)?;
        fs::rename(&tmp, link)
    }

    fn clear_link(&mut self, slot: FirmwareSlot) -> io::Result<()> {
        ignore_missing(fs::remove_file(self.link(slot)))
    }
}
