//! Firmware register space, mapped from a memory device.
//!
//! ```text
//!  base + 0x0000  ID, DATE_VERSION, CLOCK_CTRL ...   (fsm::context::regs)
//!  base + 0x0800  PLL_CTRL
//!  base + 0x1000  link training block
//!                   0x1000 LINK_CTRL     bit0 lock req  bit1 train  bit4 align  bit5 scan
//!                   0x1004 LINK_STAT     bit0 locked    bit1 trained bit4 aligned bit5 scanned
//!                   0x1008 ALIGN_RESULT  chosen receive clock phase
//!                   0x100C EYE_RESULT    [15:0] delay, [23:16] offset
//!                   0x1010 IDELAY
//!                   0x1014 LINK_OFFSET
//! ```
//!
//! Alignment and eye scans run in firmware; the adapter starts them and
//! waits a bounded time for the done bit.

use std::fs::OpenOptions;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::ptr::NonNull;
use std::thread;
use std::time::Duration;

use log::debug;

use crate::app::ports::{BoardPort, EyeCenter};

pub mod link {
    pub const CTRL: u32 = 0x1000;
    pub const STAT: u32 = 0x1004;
    pub const ALIGN_RESULT: u32 = 0x1008;
    pub const EYE_RESULT: u32 = 0x100C;
    pub const IDELAY: u32 = 0x1010;
    pub const OFFSET: u32 = 0x1014;

    pub const LOCK: u32 = 1 << 0;
    pub const TRAIN: u32 = 1 << 1;
    pub const ALIGN: u32 = 1 << 4;
    pub const SCAN: u32 = 1 << 5;
}

/// Bytes mapped: everything up to the end of the link block, page rounded.
pub const WINDOW_LEN: usize = 0x2000;

const POLL_INTERVAL: Duration = Duration::from_millis(1);
const POLL_LIMIT: u32 = 500;

// ── Register window ──────────────────────────────────────────

pub struct RegisterWindow {
    base: NonNull<u32>,
    len: usize,
}

impl RegisterWindow {
    /// Map `len` bytes of `device` starting at `offset` (page aligned).
    pub fn map(device: &Path, offset: u64, len: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(device)?;
        let off = libc::off_t::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "register base too large"))?;
        // SAFETY: fresh shared mapping of a file we hold open; checked below.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                off,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        debug!("REGS: mapped {:#x} bytes of {} at {:#x}", len, device.display(), offset);
        // The mapping outlives the descriptor.
        NonNull::new(ptr.cast::<u32>())
            .map(|base| Self { base, len })
            .ok_or_else(|| io::Error::other("mmap returned null"))
    }

    fn slot(&self, addr: u32) -> io::Result<*mut u32> {
        let a = addr as usize;
        if a % 4 != 0 || a + 4 > self.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("register {:#x} outside window", addr),
            ));
        }
        // SAFETY: in bounds and word aligned, checked above.
        Ok(unsafe { self.base.as_ptr().add(a / 4) })
    }

    pub fn read(&self, addr: u32) -> io::Result<u32> {
        let p = self.slot(addr)?;
        // SAFETY: p points into our live mapping.
        Ok(unsafe { p.read_volatile() })
    }

    pub fn write(&self, addr: u32, value: u32) -> io::Result<()> {
        let p = self.slot(addr)?;
        // SAFETY: p points into our live mapping.
        unsafe { p.write_volatile(value) };
        Ok(())
    }
}

impl Drop for RegisterWindow {
    fn drop(&mut self) {
        // SAFETY: unmapping exactly what `map` created.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.len);
        }
    }
}

// ── Board ────────────────────────────────────────────────────

pub struct MappedBoard {
    regs: RegisterWindow,
}

impl MappedBoard {
    pub fn new(regs: RegisterWindow) -> Self {
        Self { regs }
    }

    fn modify(&self, addr: u32, set: u32, clear: u32) -> io::Result<()> {
        let v = self.regs.read(addr)?;
        self.regs.write(addr, (v & !clear) | set)
    }

    /// Pulse a start bit and wait for the matching status bit.
    fn run_and_wait(&self, start: u32, what: &str) -> io::Result<()> {
        self.modify(link::CTRL, start, 0)?;
        let result = self.wait_for(start, what);
        self.modify(link::CTRL, 0, start)?;
        result
    }

    fn wait_for(&self, bit: u32, what: &str) -> io::Result<()> {
        for _ in 0..POLL_LIMIT {
            if self.regs.read(link::STAT)? & bit != 0 {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{what} did not finish"),
        ))
    }
}

impl BoardPort for MappedBoard {
    fn read_reg(&mut self, addr: u32) -> io::Result<u32> {
        self.regs.read(addr)
    }

    fn write_reg(&mut self, addr: u32, value: u32) -> io::Result<()> {
        self.regs.write(addr, value)
    }

    fn align_rxclk(&mut self) -> io::Result<u32> {
        self.run_and_wait(link::ALIGN, "receive clock alignment")?;
        self.regs.read(link::ALIGN_RESULT)
    }

    fn locate_eye(&mut self) -> io::Result<EyeCenter> {
        self.run_and_wait(link::SCAN, "eye scan")?;
        let r = self.regs.read(link::EYE_RESULT)?;
        Ok(EyeCenter {
            delay: r & 0xFFFF,
            offset: (r >> 16) & 0xFF,
        })
    }

    fn set_delay(&mut self, delay: u32) -> io::Result<()> {
        self.regs.write(link::IDELAY, delay)
    }

    fn set_link_offset(&mut self, offset: u32) -> io::Result<()> {
        self.regs.write(link::OFFSET, offset)
    }

    fn request_link_lock(&mut self) -> io::Result<()> {
        self.modify(link::CTRL, link::LOCK, 0)
    }

    fn link_locked(&mut self) -> io::Result<bool> {
        Ok(self.regs.read(link::STAT)? & link::LOCK != 0)
    }

    fn set_training(&mut self, enable: bool) -> io::Result<()> {
        if enable {
            self.modify(link::CTRL, link::TRAIN, 0)
        } else {
            self.modify(link::CTRL, 0, link::TRAIN)
        }
    }

    fn train_complete(&mut self) -> io::Result<bool> {
        Ok(self.regs.read(link::STAT)? & link::TRAIN != 0)
    }
}
