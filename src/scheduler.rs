//! Single-threaded cooperative event loop.
//!
//! Every piece of business logic runs on the thread that calls
//! [`Scheduler::run`].  Other threads (link reader, signal handler) only
//! ever send a wake byte; the loop picks it up and calls the owning
//! callback.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Wake sources                          │
//! │                                                              │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐   │
//! │  │ self      │  │ link      │  │ signal    │  │ timer    │   │
//! │  │ (run_now) │  │ (packets) │  │ (ctrlc)   │  │ (tick)   │   │
//! │  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘  └─────┬────┘   │
//! │        └──────────────┴───── Select ┴──────────────┘        │
//! │                          │                                   │
//! │                          ▼                                   │
//! │        for each source in registration order:                │
//! │            one token available? → callback(ctx, control)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sources are level-triggered: each ready source gets one callback per
//! iteration, so a burst of packets is spread across iterations and
//! never starves the timer.

use std::time::Duration;

use crossbeam_channel::{Receiver, Select, Sender, TryRecvError, unbounded};
use log::{error, info};

// ═══════════════════════════════════════════════════════════════
//  Callback types
// ═══════════════════════════════════════════════════════════════

/// Deferred unit of work scheduled with [`Control::run_now`] or
/// [`Control::run_next_tick`].
pub type Task<C> = fn(&mut C, &mut Control<C>) -> anyhow::Result<()>;

/// Called once per wake byte; receives the byte.
pub type WakeFn<C> = fn(&mut C, u8, &mut Control<C>) -> anyhow::Result<()>;

/// Called on each timer tick, after any `run_next_tick` tasks.
pub type TickFn<C> = fn(&mut C, &mut Control<C>) -> anyhow::Result<()>;

// ═══════════════════════════════════════════════════════════════
//  Control handle
// ═══════════════════════════════════════════════════════════════

/// Handed to every callback: stop the loop or re-arm work.
pub struct Control<C> {
    terminate: bool,
    now_tx: Sender<Task<C>>,
    next_tick: Vec<Task<C>>,
}

impl<C> Control<C> {
    /// Leave the loop at the end of the current iteration.
    pub fn terminate(&mut self) {
        self.terminate = true;
    }

    pub fn is_terminating(&self) -> bool {
        self.terminate
    }

    /// Run `task` on the next loop iteration.
    pub fn run_now(&mut self, task: Task<C>) {
        // The scheduler owns the receiver for its whole lifetime.
        let _ = self.now_tx.send(task);
    }

    /// Run `task` when the timer next fires.
    pub fn run_next_tick(&mut self, task: Task<C>) {
        self.next_tick.push(task);
    }

    /// Tasks waiting for the next tick.
    pub fn pending_tick_tasks(&self) -> usize {
        self.next_tick.len()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Sources
// ═══════════════════════════════════════════════════════════════

enum Source<C> {
    SelfSignal(Receiver<Task<C>>),
    Wake {
        name: &'static str,
        rx: Receiver<u8>,
        cb: WakeFn<C>,
    },
    Timer {
        rx: Receiver<std::time::Instant>,
        cb: TickFn<C>,
    },
}

impl<C> Source<C> {
    fn name(&self) -> &'static str {
        match self {
            Self::SelfSignal(_) => "self",
            Self::Wake { name, .. } => name,
            Self::Timer { .. } => "timer",
        }
    }

    fn register<'a>(&'a self, sel: &mut Select<'a>) {
        match self {
            Self::SelfSignal(rx) => sel.recv(rx),
            Self::Wake { rx, .. } => sel.recv(rx),
            Self::Timer { rx, .. } => sel.recv(rx),
        };
    }

    /// Take one token if one is waiting.
    fn poll(&self) -> Poll<C> {
        match self {
            Self::SelfSignal(rx) => match rx.try_recv() {
                Ok(task) => Poll::Task(task),
                Err(TryRecvError::Empty) => Poll::Idle,
                Err(TryRecvError::Disconnected) => Poll::Lost,
            },
            Self::Wake { rx, cb, .. } => match rx.try_recv() {
                Ok(byte) => Poll::Wake(*cb, byte),
                Err(TryRecvError::Empty) => Poll::Idle,
                Err(TryRecvError::Disconnected) => Poll::Lost,
            },
            Self::Timer { rx, cb } => match rx.try_recv() {
                Ok(_) => Poll::Tick(*cb),
                Err(TryRecvError::Empty) => Poll::Idle,
                Err(TryRecvError::Disconnected) => Poll::Lost,
            },
        }
    }

    /// Discard everything still queued on this source.
    fn drain(&self) -> usize {
        match self {
            Self::SelfSignal(rx) => rx.try_iter().count(),
            Self::Wake { rx, .. } => rx.try_iter().count(),
            Self::Timer { .. } => 0,
        }
    }
}

enum Poll<C> {
    Idle,
    Lost,
    Task(Task<C>),
    Wake(WakeFn<C>, u8),
    Tick(TickFn<C>),
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

/// What happened during a [`Scheduler::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Outer loop iterations executed.
    pub iterations: u64,
    /// Timer ticks delivered.
    pub ticks: u64,
    /// Wake tokens left unprocessed at exit.
    pub discarded: usize,
    /// The loop stopped because a callback failed or a source went away.
    pub failed: bool,
}

pub struct Scheduler<C> {
    sources: Vec<Source<C>>,
    control: Control<C>,
}

impl<C> Scheduler<C> {
    /// Empty scheduler.  The self-signal channel is always the first
    /// source so `run_now` work is picked up ahead of new I/O.
    pub fn new() -> Self {
        let (now_tx, now_rx) = unbounded();
        Self {
            sources: vec![Source::SelfSignal(now_rx)],
            control: Control {
                terminate: false,
                now_tx,
                next_tick: Vec::new(),
            },
        }
    }

    /// Register a wake channel.  Callbacks run in registration order.
    pub fn add_wake_source(&mut self, name: &'static str, rx: Receiver<u8>, cb: WakeFn<C>) {
        info!("Scheduler: registered source '{}'", name);
        self.sources.push(Source::Wake { name, rx, cb });
    }

    /// Register the periodic timer.
    pub fn add_timer(&mut self, interval: Duration, cb: TickFn<C>) {
        info!("Scheduler: timer every {:?}", interval);
        self.sources.push(Source::Timer {
            rx: crossbeam_channel::tick(interval),
            cb,
        });
    }

    /// Control handle for seeding work before [`run`](Self::run).
    pub fn control(&mut self) -> &mut Control<C> {
        &mut self.control
    }

    /// Run until a callback terminates the loop.  Work re-armed before
    /// the stop survives into the next `run`.
    pub fn run(&mut self, ctx: &mut C) -> RunSummary {
        let mut summary = RunSummary::default();
        self.control.terminate = false;

        while !self.control.terminate {
            summary.iterations += 1;
            {
                let mut sel = Select::new();
                for src in &self.sources {
                    src.register(&mut sel);
                }
                sel.ready();
            }

            for idx in 0..self.sources.len() {
                let result = match self.sources[idx].poll() {
                    Poll::Idle => continue,
                    Poll::Lost => {
                        error!("Scheduler: source '{}' disconnected", self.sources[idx].name());
                        summary.failed = true;
                        self.control.terminate();
                        continue;
                    }
                    Poll::Task(task) => task(ctx, &mut self.control),
                    Poll::Wake(cb, byte) => cb(ctx, byte, &mut self.control),
                    Poll::Tick(cb) => {
                        summary.ticks += 1;
                        self.fire_tick(ctx, cb)
                    }
                };

                if let Err(e) = result {
                    error!(
                        "Scheduler: '{}' callback failed: {:#}",
                        self.sources[idx].name(),
                        e
                    );
                    summary.failed = true;
                    self.control.terminate();
                }
            }
        }

        summary.discarded = self.sources.iter().map(Source::drain).sum();
        if summary.discarded > 0 {
            info!(
                "Scheduler: discarded {} pending wake token(s) at exit",
                summary.discarded
            );
        }
        summary
    }

    fn fire_tick(&mut self, ctx: &mut C, cb: TickFn<C>) -> anyhow::Result<()> {
        // Tasks queued while these run wait for the following tick.
        let due = std::mem::take(&mut self.control.next_tick);
        for task in due {
            task(ctx, &mut self.control)?;
        }
        cb(ctx, &mut self.control)
    }
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}
