//! Daemon configuration
//!
//! Everything site-specific: link, addressing, timing, device paths and
//! the bring-up halt point.  Loaded from JSON; missing fields take their
//! defaults, then command-line flags override individual values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fsm::StateId;
use crate::hsk::packet::addr;

/// Physical housekeeping link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkConfig {
    /// UART carrying a COBS byte stream.
    Serial { device: PathBuf, baud: u32 },
    /// One frame per UDP datagram.  Replies go to `remote` if set,
    /// otherwise to whoever sent last.
    Udp {
        bind: String,
        #[serde(default)]
        remote: Option<String>,
    },
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig::Serial {
            device: PathBuf::from("/dev/ttyPS1"),
            baud: 500_000,
        }
    }
}

/// Core daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    // --- Link ---
    pub link: LinkConfig,

    // --- Addressing ---
    /// Housekeeping address.  When unset it is derived from the SoC id.
    pub my_id: Option<u8>,
    /// SoC id.  When unset it is read from the EEPROM.
    pub soc_id: Option<u8>,
    /// at24 EEPROM contents (SoC id, location, startup page).
    pub eeprom_path: PathBuf,

    // --- Timing ---
    /// Scheduler timer period (milliseconds)
    pub tick_interval_ms: u64,
    /// Log traffic counters every N ticks; 0 disables
    pub stats_log_interval_ticks: u64,

    // --- Firmware slots ---
    pub next_firmware_link: PathBuf,
    pub next_software_link: PathBuf,
    pub current_firmware_link: PathBuf,

    // --- Bring-up hardware ---
    /// Register dump for the sample clock synthesiser
    pub clock_config: PathBuf,
    /// spidev node of the clock synthesiser
    pub clock_spi_device: PathBuf,
    /// sysfs GPIO number of the synthesiser reset line
    pub clock_reset_gpio: u32,
    /// Memory device exposing the firmware register space
    pub register_device: PathBuf,
    /// Offset of the register space within `register_device`
    pub register_base: u64,
    /// Halt bring-up at this state (name or ordinal); unset runs it all
    pub end_state: Option<String>,

    // --- Platform ---
    pub iio_device: PathBuf,
    pub nvmem_path: PathBuf,
    pub net_interface: String,
    pub platform_version_path: PathBuf,

    // --- Services ---
    pub journal_command: String,
    /// Upper bound on one journal query (milliseconds)
    pub journal_timeout_ms: u64,
    /// systemd unit started by download mode
    pub ingest_unit: String,

    // --- Logging ---
    /// Used when no `-v` flag is given: error, warn, info, debug, trace
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),

            my_id: None,
            soc_id: None,
            eeprom_path: PathBuf::from("/sys/bus/i2c/devices/1-0050/eeprom"),

            tick_interval_ms: 1_000,      // 1 Hz
            stats_log_interval_ticks: 60, // once a minute

            next_firmware_link: PathBuf::from("/lib/firmware/next"),
            next_software_link: PathBuf::from("/home/root/next_software"),
            current_firmware_link: PathBuf::from("/lib/firmware/current"),

            clock_config: PathBuf::from("/usr/local/share/SURF6_LMK.txt"),
            clock_spi_device: PathBuf::from("/dev/spidev1.0"),
            clock_reset_gpio: 338,
            register_device: PathBuf::from("/dev/mem"),
            register_base: 0xA000_0000,
            end_state: None,

            iio_device: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
            nvmem_path: PathBuf::from("/sys/bus/nvmem/devices/zynqmp-nvmem0/nvmem"),
            net_interface: String::from("eth0"),
            platform_version_path: PathBuf::from("/etc/petalinux/version"),

            journal_command: String::from("journalctl --no-pager"),
            journal_timeout_ms: 5_000,
            ingest_unit: String::from("pyfwupd.service"),

            log_level: String::from("info"),
        }
    }
}

impl DaemonConfig {
    /// Read a JSON file and validate it.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be non-zero"));
        }
        if self.journal_timeout_ms == 0 {
            return Err(ConfigError::Invalid("journal_timeout_ms must be non-zero"));
        }
        if let LinkConfig::Serial { baud: 0, .. } = self.link {
            return Err(ConfigError::Invalid("serial baud must be non-zero"));
        }
        if matches!(self.my_id, Some(addr::CONSOLE) | Some(0xFF)) {
            return Err(ConfigError::Invalid("my_id collides with a reserved address"));
        }
        if self.soc_id.is_some_and(|id| id > addr::MAX_SOC_ID) {
            return Err(ConfigError::Invalid("soc_id out of range"));
        }
        self.end_state()?;
        self.log_level()?;
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn journal_timeout(&self) -> Duration {
        Duration::from_millis(self.journal_timeout_ms)
    }

    pub fn end_state(&self) -> Result<Option<StateId>, ConfigError> {
        self.end_state.as_deref().map(str::parse::<StateId>).transpose()
    }

    pub fn log_level(&self) -> Result<log::LevelFilter, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid("unknown log_level"))
    }

    /// Settle addressing and the bring-up halt point.  Explicit settings
    /// win over what the EEPROM says.
    pub fn resolve(
        &self,
        eeprom_soc_id: Option<u8>,
        eeprom_startup: Option<StateId>,
    ) -> Result<Identity, ConfigError> {
        let soc_id = self.soc_id.or(eeprom_soc_id);
        let my_id = match (self.my_id, soc_id) {
            (Some(id), _) => id,
            (None, Some(soc)) if soc <= addr::MAX_SOC_ID => addr::digitizer(soc),
            (None, Some(_)) => return Err(ConfigError::Invalid("soc_id out of range")),
            (None, None) => return Err(ConfigError::Invalid("no my_id and no SoC id")),
        };
        let end_state = match self.end_state()? {
            Some(s) => Some(s),
            None => eeprom_startup,
        };
        Ok(Identity {
            my_id,
            soc_id,
            end_state,
        })
    }
}

/// Startup values settled from config, flags and the EEPROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub my_id: u8,
    pub soc_id: Option<u8>,
    pub end_state: Option<StateId>,
}
