//! surfhskd: SoC digitizer housekeeping daemon.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SerialLink / UdpLink   ZynqPlatform   EepromInfo  SymlinkStore│
//! │  (Transport)            (Sensor+Id)    (Location)  (Firmware)  │
//! │  Journalctl   SystemdUnit   MappedBoard   Lmk0461x   SysfsPin  │
//! │  (Journal)    (Ingest)      (Board)       (Clock)    (reset)   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │   Daemon: HskEngine (commands) · Bringup (FSM)         │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Scheduler (link · signal · timer)      hsk-io reader thread   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The exit status tells the supervising script what to do next: a
//! restart code requested over housekeeping, 0 on a termination signal,
//! or 0x80 after a fatal error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::{ArgAction, Parser};
use log::{LevelFilter, error, info, warn};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

use surfhskd::adapters::clock::{Lmk0461x, Spidev};
use surfhskd::adapters::eeprom::EepromInfo;
use surfhskd::adapters::firmware::SymlinkStore;
use surfhskd::adapters::gpio::SysfsPin;
use surfhskd::adapters::ingest::SystemdUnit;
use surfhskd::adapters::journal::Journalctl;
use surfhskd::adapters::registers::{MappedBoard, RegisterWindow, WINDOW_LEN};
use surfhskd::adapters::serial::SerialLink;
use surfhskd::adapters::udp::UdpLink;
use surfhskd::adapters::zynq::ZynqPlatform;
use surfhskd::adapters::signal;
use surfhskd::app::daemon::{Daemon, FATAL_EXIT};
use surfhskd::config::{DaemonConfig, LinkConfig};
use surfhskd::fsm::Bringup;
use surfhskd::fsm::context::BringupContext;
use surfhskd::hsk::channels::{PacketQueue, Statistics};
use surfhskd::hsk::engine::{HskEngine, Services};
use surfhskd::hsk::io_task::{self, Ingress, LinkWriter, address_filter};
use surfhskd::hsk::transport::Transport;
use surfhskd::scheduler::Scheduler;

const GPIO_ROOT: &str = "/sys/class/gpio";

#[derive(Parser, Debug)]
#[command(name = "surfhskd", version, about = "SoC digitizer housekeeping daemon")]
struct Cli {
    /// JSON configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device carrying housekeeping
    #[arg(long, conflicts_with = "udp_bind")]
    device: Option<PathBuf>,

    /// Serial baud rate
    #[arg(long, requires = "device")]
    baud: Option<u32>,

    /// Carry housekeeping over UDP, bound to this address
    #[arg(long)]
    udp_bind: Option<String>,

    /// Fixed UDP peer for replies
    #[arg(long, requires = "udp_bind")]
    udp_remote: Option<String>,

    /// Housekeeping address (decimal or 0x-prefixed hex)
    #[arg(long, value_parser = parse_u8)]
    my_id: Option<u8>,

    /// Halt bring-up at this state (name or ordinal)
    #[arg(long)]
    end_state: Option<String>,

    /// More logging; repeat for trace
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let r = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    r.map_err(|e| format!("{s:?}: {e}"))
}

impl Cli {
    /// Fold command-line overrides into the configuration.
    fn apply(&self, cfg: &mut DaemonConfig) {
        if let Some(device) = &self.device {
            let baud = match (&cfg.link, self.baud) {
                (_, Some(b)) => b,
                (LinkConfig::Serial { baud, .. }, None) => *baud,
                _ => 500_000,
            };
            cfg.link = LinkConfig::Serial {
                device: device.clone(),
                baud,
            };
        }
        if let Some(bind) = &self.udp_bind {
            cfg.link = LinkConfig::Udp {
                bind: bind.clone(),
                remote: self.udp_remote.clone(),
            };
        }
        if self.my_id.is_some() {
            cfg.my_id = self.my_id;
        }
        if self.end_state.is_some() {
            cfg.end_state = self.end_state.clone();
        }
    }

    fn log_level(&self, cfg: Option<&DaemonConfig>) -> LevelFilter {
        match self.verbose {
            0 => cfg
                .and_then(|c| c.log_level().ok())
                .unwrap_or(LevelFilter::Info),
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<DaemonConfig> {
    let mut cfg = match &cli.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    cli.apply(&mut cfg);
    cfg.validate().context("command-line overrides")?;
    Ok(cfg)
}

fn init_logging(level: LevelFilter) {
    let config = ConfigBuilder::new().set_time_format_rfc3339().build();
    if let Err(e) = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto) {
        eprintln!("surfhskd: logger unavailable: {e}");
    }
}

fn open_link(link: &LinkConfig) -> anyhow::Result<Box<dyn Transport>> {
    Ok(match link {
        LinkConfig::Serial { device, baud } => Box::new(
            SerialLink::open(device, *baud)
                .with_context(|| format!("opening {}", device.display()))?,
        ),
        LinkConfig::Udp { bind, remote } => Box::new(
            UdpLink::bind(bind, remote.as_deref()).with_context(|| format!("binding {bind}"))?,
        ),
    })
}

fn services(cfg: &DaemonConfig, eeprom: EepromInfo) -> Services {
    let platform = || {
        ZynqPlatform::new(
            cfg.iio_device.clone(),
            cfg.nvmem_path.clone(),
            cfg.net_interface.clone(),
            cfg.platform_version_path.clone(),
        )
    };
    Services {
        sensors: Box::new(platform()),
        identity: Box::new(platform()),
        location: Box::new(eeprom),
        firmware: Box::new(SymlinkStore::new(
            cfg.next_firmware_link.clone(),
            cfg.next_software_link.clone(),
            cfg.current_firmware_link.clone(),
        )),
        journal: Box::new(Journalctl::new(&cfg.journal_command)),
        ingest: Box::new(SystemdUnit::new(cfg.ingest_unit.clone())),
    }
}

fn run(cfg: DaemonConfig) -> anyhow::Result<u8> {
    info!("DAEMON: surfhskd {} starting", env!("CARGO_PKG_VERSION"));

    let eeprom = EepromInfo::load(&cfg.eeprom_path);
    let id = cfg.resolve(eeprom.soc_id, eeprom.startup)?;
    match id.end_state {
        Some(s) => info!("DAEMON: address {:#04x}, bring-up halts at {:?}", id.my_id, s),
        None => info!("DAEMON: address {:#04x}, bring-up runs to completion", id.my_id),
    }

    // ── Bring-up hardware ──
    let regs = RegisterWindow::map(&cfg.register_device, cfg.register_base, WINDOW_LEN)
        .with_context(|| format!("mapping {}", cfg.register_device.display()))?;
    let spi = Spidev::open(&cfg.clock_spi_device)
        .with_context(|| format!("opening {}", cfg.clock_spi_device.display()))?;
    let reset = SysfsPin::export(Path::new(GPIO_ROOT), cfg.clock_reset_gpio)
        .with_context(|| format!("exporting GPIO {}", cfg.clock_reset_gpio))?;
    let ctx = BringupContext::new(
        MappedBoard::new(regs),
        Lmk0461x::new(spi),
        reset,
        cfg.clock_config.clone(),
    );

    // ── Link ──
    let reader = open_link(&cfg.link)?;
    let writer = reader.try_clone().context("second handle on link")?;
    let stats = Arc::new(Statistics::new());
    let queue = Arc::new(PacketQueue::new());
    let (wake_tx, wake_rx) = crossbeam_channel::unbounded();
    let stop = Arc::new(AtomicBool::new(false));
    let ingress = Ingress::new(
        queue.clone(),
        stats.clone(),
        address_filter(id.my_id),
        wake_tx,
    );
    let io = io_task::spawn(reader, ingress, stop.clone()).context("spawning link reader")?;

    let signal_rx = signal::install().context("installing signal handler")?;

    // ── Daemon ──
    let engine = HskEngine::new(id.my_id, services(&cfg, eeprom), stats.clone())
        .with_journal_timeout(cfg.journal_timeout());
    let mut daemon = Daemon::new(
        engine,
        Bringup::new(ctx, id.end_state),
        queue,
        LinkWriter::new(writer, stats.clone()),
        stats,
    )
    .with_stats_log_every(cfg.stats_log_interval_ticks);

    let mut sched = Scheduler::new();
    Daemon::install(&mut sched, wake_rx, signal_rx, cfg.tick_interval());
    let summary = sched.run(&mut daemon);
    let code = daemon.finish(&summary);

    stop.store(true, Ordering::Relaxed);
    if io.join().is_err() {
        warn!("DAEMON: link reader panicked");
    }
    Ok(code)
}

fn main() {
    let cli = Cli::parse();
    let cfg = load_config(&cli);
    init_logging(cli.log_level(cfg.as_ref().ok()));

    let code = cfg.and_then(run).unwrap_or_else(|e| {
        error!("DAEMON: {:#}", e);
        FATAL_EXIT
    });
    std::process::exit(i32::from(code));
}
