//! Function-pointer bring-up state machine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  StateTable                                              │
//! │  ┌─────────────────┬───────────────────┬──────────────┐  │
//! │  │ StateId          │ name              │ run          │  │
//! │  ├─────────────────┼───────────────────┼──────────────┤  │
//! │  │ Begin            │ "Begin"           │ fn(ctx)->Step│  │
//! │  │ WaitClock        │ "WaitClock"       │ fn(ctx)->Step│  │
//! │  │ ...              │                   │              │  │
//! │  │ DisableTrain     │ "DisableTrain"    │ fn(ctx)->Step│  │
//! │  └─────────────────┴───────────────────┴──────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Bringup::run`] performs exactly one step and tells the caller when
//! to call it again: immediately (`Rearm::Now`) after an action, or on
//! the next timer tick (`Rearm::NextTick`) after a poll that is not
//! ready.  The machine parks (re-arms on ticks without touching the
//! hardware) when it reaches `end_state`, finishes the sequence, or
//! fails.  `Failure` is terminal for the life of the process.

pub mod context;
pub mod states;

use anyhow::Context as _;
use embedded_hal::digital::OutputPin;
use log::{error, info};

use crate::app::ports::{BoardPort, ClockChip};
use crate::error::{BringupFault, ConfigError};
use context::BringupContext;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Bring-up states.  Ordinals are reported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum StateId {
    Begin = 0,
    WaitClock = 1,
    ResetClock = 2,
    ResetClockDelay = 3,
    ProgramClock = 4,
    WaitClockLock = 5,
    EnableClock = 6,
    WaitPllLock = 7,
    AlignLink = 8,
    LocateEye = 9,
    LinkLock = 10,
    WaitLinkLocked = 11,
    EnableTrain = 12,
    WaitTrain = 13,
    DisableTrain = 14,
    Failure = 0xFF,
}

impl StateId {
    /// Number of table-driven states (everything except `Failure`).
    pub const COUNT: usize = 15;

    const ORDERED: [StateId; Self::COUNT] = [
        Self::Begin,
        Self::WaitClock,
        Self::ResetClock,
        Self::ResetClockDelay,
        Self::ProgramClock,
        Self::WaitClockLock,
        Self::EnableClock,
        Self::WaitPllLock,
        Self::AlignLink,
        Self::LocateEye,
        Self::LinkLock,
        Self::WaitLinkLocked,
        Self::EnableTrain,
        Self::WaitTrain,
        Self::DisableTrain,
    ];

    /// Decode a wire ordinal.
    pub fn from_u8(v: u8) -> Option<Self> {
        if v == Self::Failure as u8 {
            return Some(Self::Failure);
        }
        Self::ORDERED.get(v as usize).copied()
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Accepts a state name (any case) or its decimal ordinal.  `Failure`
/// cannot be chosen as a halt point.
impl core::str::FromStr for StateId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let found = match s.parse::<u8>() {
            Ok(n) => Self::ORDERED.get(n as usize).copied(),
            Err(_) => Self::ORDERED
                .iter()
                .copied()
                .find(|st| format!("{:?}", st).eq_ignore_ascii_case(s)),
        };
        found.ok_or(ConfigError::Invalid("unknown bring-up state"))
    }
}

// ---------------------------------------------------------------------------
// Step outcome and scheduling hint
// ---------------------------------------------------------------------------

/// What a state function decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Move on and run the next state right away.
    Advance(StateId),
    /// Move on, but not before the next tick.
    AdvanceNextTick(StateId),
    /// Condition not met yet; poll again next tick.
    Wait,
    /// Unrecoverable; park in `Failure`.
    Fail(BringupFault),
    /// Sequence finished.
    Complete,
}

/// When the scheduler should call [`Bringup::run`] again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rearm {
    Now,
    NextTick,
}

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub type StepFn<B, K, P> = fn(&mut BringupContext<B, K, P>) -> anyhow::Result<Step>;

pub struct StateDescriptor<B, K, P> {
    pub id: StateId,
    pub name: &'static str,
    pub run: StepFn<B, K, P>,
}

impl<B, K, P> StateDescriptor<B, K, P> {
    pub const fn new(id: StateId, name: &'static str, run: StepFn<B, K, P>) -> Self {
        Self { id, name, run }
    }
}

// ---------------------------------------------------------------------------
// Handle used by the command engine
// ---------------------------------------------------------------------------

/// What housekeeping commands may see and change about bring-up.
pub trait StartupControl {
    fn state(&self) -> StateId;
    fn end_state(&self) -> Option<StateId>;
    /// `None` runs the sequence to completion.
    fn set_end_state(&mut self, end: Option<StateId>);
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Bringup<B, K, P> {
    table: [StateDescriptor<B, K, P>; StateId::COUNT],
    state: StateId,
    end_state: Option<StateId>,
    complete: bool,
    fault: Option<BringupFault>,
    steps: u64,
    ctx: BringupContext<B, K, P>,
}

impl<B, K, P> Bringup<B, K, P>
where
    B: BoardPort,
    K: ClockChip,
    P: OutputPin,
{
    pub fn new(ctx: BringupContext<B, K, P>, end_state: Option<StateId>) -> Self {
        let table = states::build_state_table();
        debug_assert!(table.iter().enumerate().all(|(i, d)| d.id as usize == i));
        Self {
            table,
            state: StateId::Begin,
            end_state,
            complete: false,
            fault: None,
            steps: 0,
            ctx,
        }
    }

    /// Perform one step.  Hardware I/O errors are returned as-is and
    /// are fatal to the daemon.
    pub fn run(&mut self) -> anyhow::Result<Rearm> {
        if self.is_parked() {
            return Ok(Rearm::NextTick);
        }

        let desc = &self.table[self.state as usize];
        let name = desc.name;
        let step = (desc.run)(&mut self.ctx).with_context(|| format!("bring-up state {}", name))?;
        self.steps += 1;

        Ok(match step {
            Step::Advance(next) => {
                self.transition(next);
                Rearm::Now
            }
            Step::AdvanceNextTick(next) => {
                self.transition(next);
                Rearm::NextTick
            }
            Step::Wait => Rearm::NextTick,
            Step::Fail(fault) => {
                error!("BRINGUP: {} failed: {}", name, fault);
                self.fault = Some(fault);
                self.state = StateId::Failure;
                Rearm::NextTick
            }
            Step::Complete => {
                info!("BRINGUP: bring-up complete");
                self.complete = true;
                Rearm::NextTick
            }
        })
    }

    /// True when `run` will not touch the hardware.
    pub fn is_parked(&self) -> bool {
        self.state == StateId::Failure || self.complete || Some(self.state) == self.end_state
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn fault(&self) -> Option<BringupFault> {
        self.fault
    }

    /// State functions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn context(&self) -> &BringupContext<B, K, P> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut BringupContext<B, K, P> {
        &mut self.ctx
    }

    fn transition(&mut self, next: StateId) {
        info!(
            "BRINGUP: {} -> {}",
            self.table[self.state as usize].name,
            self.table[next as usize].name
        );
        self.state = next;
    }
}

impl<B, K, P> StartupControl for Bringup<B, K, P>
where
    B: BoardPort,
    K: ClockChip,
    P: OutputPin,
{
    fn state(&self) -> StateId {
        self.state
    }

    fn end_state(&self) -> Option<StateId> {
        self.end_state
    }

    fn set_end_state(&mut self, end: Option<StateId>) {
        info!("BRINGUP: end state {:?} -> {:?}", self.end_state, end);
        self.end_state = end;
    }
}



#[cfg(test)]
mod proptests {
    use super::mock::{MockBoard, MockClock, MockPin};
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Random readiness never lets the sequence skip a state or go
        /// backwards.
        #[test]
        fn state_only_moves_forward(
            ready in proptest::collection::vec((any::<bool>(), any::<bool>(), any::<bool>()), 1..200)
        ) {
            let cfg = tempfile::NamedTempFile::new().unwrap();
            let mut board = MockBoard::ready();
            board.link_locked = false;
            board.trained = false;
            let clock = MockClock::default();
            let ctx = BringupContext::new(board, clock, MockPin::default(), cfg.path().into());
            let mut b = Bringup::new(ctx, None);

            let mut last = b.state();
            for (clk, link, train) in ready {
                let ctx = b.context_mut();
                ctx.clock.status = if clk { context::CLOCK_LOCKED } else { 0 };
                ctx.board.link_locked = link;
                ctx.board.trained = train;
                b.run().unwrap();
                let now = b.state();
                prop_assert!(now != StateId::Failure);
                prop_assert!(now.as_u8() == last.as_u8() || now.as_u8() == last.as_u8() + 1,
                    "jumped from {:?} to {:?}", last, now);
                last = now;
            }
        }
    }
}
