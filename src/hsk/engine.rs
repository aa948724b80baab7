//! Housekeeping dispatch engine.
//!
//! The engine does not own a transport.  The daemon pops a decoded
//! [`Packet`] off the ingress queue, hands it to [`HskEngine::dispatch`]
//! and sends whatever reply comes back.
//!
//! ```text
//!   Packet ──▶ CommandTable[cmd] ──▶ handler ──▶ Reply::Data  ──▶ {me → src, cmd}
//!                   │                        └─▶ Reply::Error ──▶ {me → src, 0xFF}
//!                   └─ empty slot ──▶ no reply
//! ```
//!
//! Handlers return `anyhow::Result<Reply>`.  `Reply::Error` is an
//! ordinary, expected refusal; `Err` means the daemon can no longer
//! trust its platform and the scheduler shuts down.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{debug, info, warn};

use super::channels::Statistics;
use super::handlers;
use super::packet::{Packet, Payload, MAX_DATA, opcode};
use super::restart::RestartCode;
use crate::app::ports::{
    FirmwareStore, IdentityPort, IngestService, JournalPort, LocationPort, SensorPort,
};
use crate::error::CommandError;
use crate::fsm::StartupControl;

// ── Reply ────────────────────────────────────────────────────

/// What a handler wants sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Success: reply with the request's opcode.
    Data(Payload),
    /// Refusal: reply with the error opcode.
    Error(CommandError, Payload),
}

impl Reply {
    pub fn empty() -> Self {
        Reply::Data(Payload::new())
    }

    /// Success reply from a byte slice, truncated to fit a packet.
    pub fn bytes(data: &[u8]) -> Self {
        Reply::Data(truncated(data))
    }

    /// Refusal echoing `data` back to the requester.
    pub fn refuse(err: CommandError, data: &[u8]) -> Self {
        Reply::Error(err, truncated(data))
    }
}

pub(super) fn truncated(data: &[u8]) -> Payload {
    let n = data.len().min(MAX_DATA);
    let mut p = Payload::new();
    // Cannot fail: n <= capacity.
    let _ = p.extend_from_slice(&data[..n]);
    p
}

// ── Command table ────────────────────────────────────────────

pub type HandlerFn =
    fn(&mut HskEngine, &Packet, &mut dyn StartupControl) -> anyhow::Result<Reply>;

#[derive(Clone, Copy)]
pub struct CommandEntry {
    pub name: &'static str,
    pub handler: HandlerFn,
}

/// Opcode → handler.  Built once; read-only afterwards.
pub struct CommandTable {
    entries: [Option<CommandEntry>; 256],
}

impl CommandTable {
    /// The daemon's full command set.
    pub fn standard() -> Self {
        let mut t = Self {
            entries: [None; 256],
        };
        t.register(opcode::PING, "ping", handlers::ping);
        t.register(opcode::STATISTICS, "statistics", handlers::statistics);
        t.register(opcode::TEMPS, "temps", handlers::temps);
        t.register(opcode::VOLTS, "volts", handlers::volts);
        t.register(opcode::IDENTIFY, "identify", handlers::identify);
        t.register(opcode::START_STATE, "start-state", handlers::start_state);
        t.register(opcode::FW_NEXT, "fw-next", handlers::fw_next);
        t.register(opcode::SOFT_NEXT, "soft-next", handlers::soft_next);
        t.register(opcode::SOFT_NEXT_REBOOT, "soft-next-reboot", handlers::soft_next_reboot);
        t.register(opcode::JOURNAL, "journal", handlers::journal);
        t.register(opcode::DOWNLOAD_MODE, "download-mode", handlers::download_mode);
        t.register(opcode::RESTART, "restart", handlers::restart);
        t
    }

    fn register(&mut self, op: u8, name: &'static str, handler: HandlerFn) {
        self.entries[op as usize] = Some(CommandEntry { name, handler });
    }

    pub fn lookup(&self, op: u8) -> Option<CommandEntry> {
        self.entries[op as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Services ─────────────────────────────────────────────────

/// Platform collaborators the handlers call into.
pub struct Services {
    pub sensors: Box<dyn SensorPort>,
    pub identity: Box<dyn IdentityPort>,
    pub location: Box<dyn LocationPort>,
    pub firmware: Box<dyn FirmwareStore>,
    pub journal: Box<dyn JournalPort>,
    pub ingest: Box<dyn IngestService>,
}

// ── Journal cursor ───────────────────────────────────────────

/// Output of the last journal query, handed out one packet at a time.
#[derive(Debug, Default)]
pub struct JournalCursor {
    buf: Vec<u8>,
    pos: usize,
}

impl JournalCursor {
    pub fn load(&mut self, output: Vec<u8>) {
        self.buf = output;
        self.pos = 0;
    }

    /// Next chunk of at most one packet; empty once exhausted.
    pub fn next_chunk(&mut self) -> &[u8] {
        let start = self.pos;
        let end = (start + MAX_DATA).min(self.buf.len());
        self.pos = end;
        &self.buf[start..end]
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

// ── Engine ───────────────────────────────────────────────────

pub struct HskEngine {
    my_id: u8,
    table: CommandTable,
    pub(super) services: Services,
    pub(super) stats: Arc<Statistics>,
    pub(super) journal: JournalCursor,
    pub(super) journal_timeout: Duration,
    pub(super) restart: Option<RestartCode>,
    /// Download mode started the ingest service and it should be stopped
    /// on the way out.
    pub(super) ingest_started: bool,
}

impl HskEngine {
    pub fn new(my_id: u8, services: Services, stats: Arc<Statistics>) -> Self {
        Self {
            my_id,
            table: CommandTable::standard(),
            services,
            stats,
            journal: JournalCursor::default(),
            journal_timeout: Duration::from_secs(5),
            restart: None,
            ingest_started: false,
        }
    }

    pub fn with_journal_timeout(mut self, timeout: Duration) -> Self {
        self.journal_timeout = timeout;
        self
    }

    pub fn my_id(&self) -> u8 {
        self.my_id
    }

    /// Handle one packet.  Unknown opcodes produce no reply.
    pub fn dispatch(
        &mut self,
        pkt: &Packet,
        startup: &mut dyn StartupControl,
    ) -> anyhow::Result<Option<Packet>> {
        let Some(entry) = self.table.lookup(pkt.cmd) else {
            info!("HSK: ignoring unknown command {:#04x} from {:#04x}", pkt.cmd, pkt.src);
            return Ok(None);
        };
        debug!(
            "HSK: {} from {:#04x} ({} bytes)",
            entry.name,
            pkt.src,
            pkt.data.len()
        );

        let reply = (entry.handler)(self, pkt, startup)
            .with_context(|| format!("handling {}", entry.name))?;

        Ok(Some(match reply {
            Reply::Data(data) => pkt.reply(self.my_id, pkt.cmd, data),
            Reply::Error(err, data) => {
                warn!("HSK: {} from {:#04x} refused: {}", entry.name, pkt.src, err);
                pkt.reply(self.my_id, opcode::ERROR, data)
            }
        }))
    }

    /// Restart requested by a command, if any.  Once set the daemon
    /// should stop taking work and exit with this code.
    pub fn pending_restart(&self) -> Option<RestartCode> {
        self.restart
    }

    /// Undo side effects that must not outlive the daemon.
    pub fn shutdown(&mut self) -> anyhow::Result<()> {
        if self.ingest_started {
            info!("HSK: stopping ingest service left running by download mode");
            self.services
                .ingest
                .stop()
                .context("stopping ingest service")?;
            self.ingest_started = false;
        }
        Ok(())
    }
}
