//! Concrete bring-up steps and table builder.
//!
//! Each state is one plain `fn` that performs a single action or poll
//! and reports how the sequence should proceed.  Polls that are not
//! ready yet wait for the next timer tick; actions chain immediately.
//!
//! ```text
//!  Begin ─▶ WaitClock ─▶ ResetClock ─tick─▶ ResetClockDelay ─▶ ProgramClock
//!    │                                                            │
//!    │ (wrong id)                                   (no config)   │
//!    ▼                                                            ▼
//!  Failure ◀──────────────────────────────────────────────────────┘
//!
//!  ProgramClock ─▶ WaitClockLock ─▶ EnableClock ─▶ WaitPllLock ─▶ AlignLink
//!  AlignLink ─▶ LocateEye ─▶ LinkLock ─▶ WaitLinkLocked ─▶ EnableTrain
//!  EnableTrain ─▶ WaitTrain ─▶ DisableTrain ─▶ (complete, parked)
//! ```

use anyhow::{Context, Result};
use embedded_hal::digital::OutputPin;
use log::info;

use super::context::{BringupContext, CLOCK_LOCKED, regs};
use super::{StateDescriptor, StateId, Step};
use crate::app::ports::{BoardPort, ClockChip};
use crate::error::BringupFault;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the state table.  Index `i` describes `StateId` ordinal `i`.
pub fn build_state_table<B, K, P>() -> [StateDescriptor<B, K, P>; StateId::COUNT]
where
    B: BoardPort,
    K: ClockChip,
    P: OutputPin,
{
    [
        StateDescriptor::new(StateId::Begin, "Begin", begin),
        StateDescriptor::new(StateId::WaitClock, "WaitClock", wait_clock),
        StateDescriptor::new(StateId::ResetClock, "ResetClock", reset_clock),
        StateDescriptor::new(StateId::ResetClockDelay, "ResetClockDelay", reset_clock_delay),
        StateDescriptor::new(StateId::ProgramClock, "ProgramClock", program_clock),
        StateDescriptor::new(StateId::WaitClockLock, "WaitClockLock", wait_clock_lock),
        StateDescriptor::new(StateId::EnableClock, "EnableClock", enable_clock),
        StateDescriptor::new(StateId::WaitPllLock, "WaitPllLock", wait_pll_lock),
        StateDescriptor::new(StateId::AlignLink, "AlignLink", align_link),
        StateDescriptor::new(StateId::LocateEye, "LocateEye", locate_eye),
        StateDescriptor::new(StateId::LinkLock, "LinkLock", link_lock),
        StateDescriptor::new(StateId::WaitLinkLocked, "WaitLinkLocked", wait_link_locked),
        StateDescriptor::new(StateId::EnableTrain, "EnableTrain", enable_train),
        StateDescriptor::new(StateId::WaitTrain, "WaitTrain", wait_train),
        StateDescriptor::new(StateId::DisableTrain, "DisableTrain", disable_train),
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Identification and rack clock
// ═══════════════════════════════════════════════════════════════════════════

fn begin<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    let id = ctx.board.read_reg(regs::ID).context("reading firmware id")?;
    if id != regs::BOARD_ID {
        return Ok(Step::Fail(BringupFault::IdentityMismatch(id)));
    }
    let dv = ctx
        .board
        .read_reg(regs::DATE_VERSION)
        .context("reading date/version")?;
    ctx.date_version = Some(dv);
    info!("BRINGUP: firmware identified, date/version {:#010x}", dv);
    Ok(Step::Advance(StateId::WaitClock))
}

fn wait_clock<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    if !ctx.reg_bit(regs::CLOCK_CTRL, regs::RACKCLK_READY_BIT)? {
        return Ok(Step::Wait);
    }
    info!("BRINGUP: rack clock is ready");
    Ok(Step::Advance(StateId::ResetClock))
}

// ═══════════════════════════════════════════════════════════════════════════
//  Sample clock synthesiser
// ═══════════════════════════════════════════════════════════════════════════

fn reset_clock<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    ctx.clock_reset(true)?;
    // Hold reset across one tick so the pulse has real width.
    Ok(Step::AdvanceNextTick(StateId::ResetClockDelay))
}

fn reset_clock_delay<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    ctx.clock_reset(false)?;
    ctx.clock.reinit().context("reinitialising clock chip")?;
    Ok(Step::Advance(StateId::ProgramClock))
}

fn program_clock<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    if !ctx.clock_config.is_file() {
        return Ok(Step::Fail(BringupFault::ClockConfigMissing));
    }
    let path = ctx.clock_config.clone();
    ctx.clock
        .configure(&path)
        .with_context(|| format!("programming clock from {}", path.display()))?;
    info!("BRINGUP: clock programmed from {}", path.display());
    Ok(Step::Advance(StateId::WaitClockLock))
}

fn wait_clock_lock<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    let st = ctx.clock.status().context("reading clock status")?;
    if st & CLOCK_LOCKED == 0 {
        return Ok(Step::Wait);
    }
    info!("BRINGUP: sample clock locked");
    Ok(Step::Advance(StateId::EnableClock))
}

fn enable_clock<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    ctx.set_reg_bit(regs::CLOCK_CTRL, regs::ACLK_ENABLE_BIT, true)?;
    ctx.set_reg_bit(regs::PLL_CTRL, regs::PLL_RESET_BIT, false)?;
    Ok(Step::Advance(StateId::WaitPllLock))
}

fn wait_pll_lock<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    if !ctx.reg_bit(regs::PLL_CTRL, regs::PLL_LOCKED_BIT)? {
        return Ok(Step::Wait);
    }
    info!("BRINGUP: PLLs locked");
    Ok(Step::Advance(StateId::AlignLink))
}

// ═══════════════════════════════════════════════════════════════════════════
//  Link training
// ═══════════════════════════════════════════════════════════════════════════

fn align_link<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    let phase = ctx.board.align_rxclk().context("aligning receive clock")?;
    ctx.rxclk_phase = Some(phase);
    info!("BRINGUP: receive clock aligned at phase {}", phase);
    Ok(Step::Advance(StateId::LocateEye))
}

fn locate_eye<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    let eye = ctx.board.locate_eye().context("scanning link eye")?;
    ctx.board.set_delay(eye.delay)?;
    ctx.board.set_link_offset(eye.offset)?;
    ctx.eye = Some(eye);
    info!("BRINGUP: eye at delay {} offset {}", eye.delay, eye.offset);
    Ok(Step::Advance(StateId::LinkLock))
}

fn link_lock<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    ctx.board.request_link_lock().context("requesting link lock")?;
    Ok(Step::Advance(StateId::WaitLinkLocked))
}

fn wait_link_locked<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    if !ctx.board.link_locked()? {
        return Ok(Step::Wait);
    }
    info!("BRINGUP: link partner locked");
    Ok(Step::Advance(StateId::EnableTrain))
}

fn enable_train<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    ctx.board.set_training(true).context("enabling training")?;
    Ok(Step::Advance(StateId::WaitTrain))
}

fn wait_train<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    if !ctx.board.train_complete()? {
        return Ok(Step::Wait);
    }
    Ok(Step::Advance(StateId::DisableTrain))
}

fn disable_train<B: BoardPort, K: ClockChip, P: OutputPin>(
    ctx: &mut BringupContext<B, K, P>,
) -> Result<Step> {
    ctx.board.set_training(false).context("disabling training")?;
    Ok(Step::Complete)
}
