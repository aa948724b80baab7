//! Zynq UltraScale+ processing-system plumbing: IIO monitor channels,
//! eFuse DNA, network MAC and version strings.
//!
//! Stateless apart from the paths; every call goes back to sysfs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::app::ports::{IdentityPort, SensorPort};

/// Byte offset of the PS DNA within the eFuse nvmem image.
const DNA_OFFSET: usize = 12;
const DNA_LEN: usize = 12;

const TEMP_CHANNELS: [&str; 2] = ["in_temp0_ps_temp_raw", "in_temp1_remote_temp_raw"];

const VOLT_CHANNELS: [&str; 6] = [
    "in_voltage7_vccpsintlp_raw",
    "in_voltage9_vccpsaux_raw",
    "in_voltage16_psmgtravtt_raw",
    "in_voltage15_psmgtravcc_raw",
    "in_voltage0_vcc_pspll0_raw",
    "in_voltage10_vccpsddr_raw",
];

pub struct ZynqPlatform {
    iio_device: PathBuf,
    nvmem: PathBuf,
    net_interface: String,
    platform_version: PathBuf,
}

impl ZynqPlatform {
    pub fn new(
        iio_device: PathBuf,
        nvmem: PathBuf,
        net_interface: String,
        platform_version: PathBuf,
    ) -> Self {
        Self {
            iio_device,
            nvmem,
            net_interface,
            platform_version,
        }
    }

    fn raw<const N: usize>(&self, channels: [&str; N]) -> io::Result<[u16; N]> {
        let mut out = [0u16; N];
        for (slot, ch) in out.iter_mut().zip(channels) {
            *slot = read_raw(&self.iio_device.join(ch))?;
        }
        Ok(out)
    }
}

fn read_trimmed(path: &Path) -> io::Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

fn read_raw(path: &Path) -> io::Result<u16> {
    let text = read_trimmed(path)?;
    text.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: not a raw reading: {:?}", path.display(), text),
        )
    })
}

/// DNA words are stored little-endian, least significant first, and
/// printed most significant first.
pub fn format_dna(raw: &[u8; DNA_LEN]) -> String {
    let word = |i: usize| u32::from_le_bytes([raw[i * 4], raw[i * 4 + 1], raw[i * 4 + 2], raw[i * 4 + 3]]);
    format!("{:08x}{:08x}{:08x}", word(2), word(1), word(0))
}

/// `M.m.r` from a semver-ish string; anything that does not fit in
/// three bytes yields `None`.
pub fn parse_version(v: &str) -> Option<(u8, u8, u8)> {
    let mut parts = v.split(['.', '-', '+']).map(str::parse::<u8>);
    let major = parts.next()?.ok()?;
    let minor = parts.next()?.ok()?;
    let rev = parts.next()?.ok()?;
    Some((major, minor, rev))
}

impl SensorPort for ZynqPlatform {
    fn raw_temps(&mut self) -> io::Result<[u16; 2]> {
        self.raw(TEMP_CHANNELS)
    }

    fn raw_volts(&mut self) -> io::Result<[u16; 6]> {
        self.raw(VOLT_CHANNELS)
    }
}

impl IdentityPort for ZynqPlatform {
    fn dna(&self) -> io::Result<String> {
        let image = fs::read(&self.nvmem)?;
        let raw: &[u8; DNA_LEN] = image
            .get(DNA_OFFSET..DNA_OFFSET + DNA_LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "eFuse image too short"))?;
        Ok(format_dna(raw))
    }

    fn mac(&self) -> io::Result<String> {
        let path = Path::new("/sys/class/net")
            .join(&self.net_interface)
            .join("address");
        read_trimmed(&path)
    }

    fn platform_version(&self) -> io::Result<String> {
        read_trimmed(&self.platform_version)
    }

    fn build_version(&self) -> Option<(u8, u8, u8)> {
        parse_version(env!("CARGO_PKG_VERSION"))
    }
}
