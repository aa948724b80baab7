//! The daemon context: everything the scheduler callbacks operate on.
//!
//! ```text
//!   link wake ──▶ on_packet ──▶ queue.pop ──▶ HskEngine ──▶ LinkWriter
//!   signal    ──▶ on_signal ──▶ terminate
//!   timer     ──▶ (tick tasks: bringup_step) ──▶ on_tick ──▶ stats log
//!   self      ──▶ bringup_step ──▶ Bringup::run ──▶ run_now / run_next_tick
//! ```
//!
//! Only the scheduler thread touches a `Daemon`.  The link reader thread
//! shares the queue and statistics, nothing else.

use std::sync::Arc;

use anyhow::{Context, bail};
use crossbeam_channel::Receiver;
use embedded_hal::digital::OutputPin;
use log::{error, info, warn};

use super::ports::{BoardPort, ClockChip};
use crate::error::TransportError;
use crate::fsm::{Bringup, Rearm};
use crate::hsk::channels::{Counters, PacketQueue, Statistics};
use crate::hsk::engine::HskEngine;
use crate::hsk::io_task::LinkWriter;
use crate::hsk::restart::RestartCode;
use crate::scheduler::{Control, RunSummary, Scheduler};

/// Exit status after a fatal error.  Deliberately not a valid restart code.
pub const FATAL_EXIT: u8 = 0x80;

/// Why the loop was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Restart(RestartCode),
    Signal,
}

pub struct Daemon<B, K, P> {
    engine: HskEngine,
    bringup: Bringup<B, K, P>,
    queue: Arc<PacketQueue>,
    link: LinkWriter,
    stats: Arc<Statistics>,
    /// Log traffic counters every this many ticks; 0 disables.
    stats_every: u64,
    ticks: u64,
    last_stats: Counters,
    exit: Option<ExitReason>,
}

impl<B, K, P> Daemon<B, K, P>
where
    B: BoardPort,
    K: ClockChip,
    P: OutputPin,
{
    pub fn new(
        engine: HskEngine,
        bringup: Bringup<B, K, P>,
        queue: Arc<PacketQueue>,
        link: LinkWriter,
        stats: Arc<Statistics>,
    ) -> Self {
        Self {
            engine,
            bringup,
            queue,
            link,
            stats,
            stats_every: 0,
            ticks: 0,
            last_stats: Counters::default(),
            exit: None,
        }
    }

    pub fn with_stats_log_every(mut self, ticks: u64) -> Self {
        self.stats_every = ticks;
        self
    }

    /// Register the standard sources in dispatch order and seed bring-up.
    pub fn install(
        sched: &mut Scheduler<Self>,
        link_rx: Receiver<u8>,
        signal_rx: Receiver<u8>,
        tick: std::time::Duration,
    ) {
        sched.add_wake_source("link", link_rx, Self::on_packet);
        sched.add_wake_source("signal", signal_rx, Self::on_signal);
        sched.add_timer(tick, Self::on_tick);
        sched.control().run_now(Self::bringup_step);
    }

    // ── Scheduler callbacks ──────────────────────────────────

    /// One queued packet per wake byte.
    pub fn on_packet(&mut self, _seq: u8, ctl: &mut Control<Self>) -> anyhow::Result<()> {
        if self.exit.is_some() {
            return Ok(());
        }
        let Some(pkt) = self.queue.try_pop() else {
            return Ok(());
        };

        if let Some(reply) = self.engine.dispatch(&pkt, &mut self.bringup)? {
            match self.link.send(&reply) {
                Ok(()) => {}
                Err(TransportError::Closed) => bail!("link closed while replying"),
                Err(e) => warn!("DAEMON: reply to {:#04x} not sent: {}", reply.dest, e),
            }
        }

        if let Some(code) = self.engine.pending_restart() {
            info!("DAEMON: leaving for {}", code);
            self.exit = Some(ExitReason::Restart(code));
            ctl.terminate();
        }
        Ok(())
    }

    pub fn on_signal(&mut self, sig: u8, ctl: &mut Control<Self>) -> anyhow::Result<()> {
        info!("DAEMON: termination signal ({}), shutting down", sig);
        self.exit.get_or_insert(ExitReason::Signal);
        ctl.terminate();
        Ok(())
    }

    pub fn on_tick(&mut self, _: &mut Control<Self>) -> anyhow::Result<()> {
        self.ticks += 1;
        if self.stats_every == 0 || self.ticks % self.stats_every != 0 {
            return Ok(());
        }
        let now = self.stats.snapshot();
        if now != self.last_stats {
            info!(
                "DAEMON: rx {} tx {} err {} drop {} filt {}",
                now.received, now.sent, now.error, now.dropped, now.filtered
            );
            self.last_stats = now;
        }
        Ok(())
    }

    pub fn bringup_step(&mut self, ctl: &mut Control<Self>) -> anyhow::Result<()> {
        match self.bringup.run()? {
            Rearm::Now => ctl.run_now(Self::bringup_step),
            Rearm::NextTick => ctl.run_next_tick(Self::bringup_step),
        }
        Ok(())
    }

    // ── Shutdown ─────────────────────────────────────────────

    /// Undo side effects and turn the run outcome into an exit status.
    pub fn finish(&mut self, summary: &RunSummary) -> u8 {
        if let Err(e) = self.engine.shutdown().context("cleanup") {
            error!("DAEMON: {:#}", e);
        }
        let code = match self.exit {
            Some(ExitReason::Restart(code)) => code.exit_code(),
            Some(ExitReason::Signal) if !summary.failed => 0,
            _ if summary.failed => FATAL_EXIT,
            _ => 0,
        };
        info!(
            "DAEMON: exiting with {:#04x} after {} iterations, {} ticks",
            code, summary.iterations, summary.ticks
        );
        code
    }

    // ── Accessors ────────────────────────────────────────────

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit
    }

    pub fn bringup(&self) -> &Bringup<B, K, P> {
        &self.bringup
    }

    pub fn engine(&self) -> &HskEngine {
        &self.engine
    }
}
