//! Bring-up sequence against the real register and clock adapters.
//!
//! The register window is a shared mapping of a scratch file, so the
//! firmware's "done" bits are simply pre-set; the clock chip sits on a
//! recording SPI bus.

use std::io::{self, Write};

use surfhskd::adapters::clock::{Lmk0461x, SpiBus};
use surfhskd::adapters::registers::{MappedBoard, RegisterWindow, WINDOW_LEN, link};
use surfhskd::app::ports::{BoardPort, EyeCenter};
use surfhskd::error::BringupFault;
use surfhskd::fsm::context::{BringupContext, regs};
use surfhskd::fsm::{Bringup, Rearm, StartupControl, StateId};

use crate::mock_hw::{MockBoard, RecordingPin};

/// Answers every read with PLL2 locked.
#[derive(Default)]
struct LockedSpi {
    sent: Vec<[u8; 3]>,
}

impl SpiBus for LockedSpi {
    fn transfer(&mut self, tx: [u8; 3]) -> io::Result<[u8; 3]> {
        self.sent.push(tx);
        Ok([0, 0, 0x02])
    }
}

struct Files {
    regs: tempfile::NamedTempFile,
    clock: tempfile::NamedTempFile,
}

fn files() -> Files {
    let regs = tempfile::NamedTempFile::new().unwrap();
    regs.as_file().set_len(WINDOW_LEN as u64).unwrap();
    let mut clock = tempfile::NamedTempFile::new().unwrap();
    writeln!(clock, "R0 (INIT)\t0x000010").unwrap();
    writeln!(clock, "R20\t0x001418").unwrap();
    Files { regs, clock }
}

type Real = Bringup<MappedBoard, Lmk0461x<LockedSpi>, RecordingPin>;

fn real_bringup(f: &Files, end: Option<StateId>) -> Real {
    let mut board = MappedBoard::new(RegisterWindow::map(f.regs.path(), 0, WINDOW_LEN).unwrap());
    board.write_reg(regs::ID, regs::BOARD_ID).unwrap();
    board.write_reg(regs::DATE_VERSION, 0x2025_0612).unwrap();
    board.write_reg(regs::CLOCK_CTRL, 1 << regs::RACKCLK_READY_BIT).unwrap();
    board
        .write_reg(regs::PLL_CTRL, (1 << regs::PLL_LOCKED_BIT) | (1 << regs::PLL_RESET_BIT))
        .unwrap();
    board
        .write_reg(link::STAT, link::LOCK | link::TRAIN | link::ALIGN | link::SCAN)
        .unwrap();
    board.write_reg(link::ALIGN_RESULT, 5).unwrap();
    board.write_reg(link::EYE_RESULT, (2 << 16) | 180).unwrap();

    let ctx = BringupContext::new(
        board,
        Lmk0461x::new(LockedSpi::default()),
        RecordingPin::default(),
        f.clock.path().to_path_buf(),
    );
    Bringup::new(ctx, end)
}

/// Step until parked; returns how many timer ticks were waited.
fn drive<B, K, P>(b: &mut Bringup<B, K, P>) -> u32
where
    B: BoardPort,
    K: surfhskd::app::ports::ClockChip,
    P: embedded_hal::digital::OutputPin,
{
    let mut ticks = 0;
    for _ in 0..200 {
        if b.is_parked() {
            return ticks;
        }
        if b.run().unwrap() == Rearm::NextTick {
            ticks += 1;
        }
    }
    panic!("bring-up never parked, stuck in {:?}", b.state());
}

#[test]
fn full_sequence_on_real_adapters() {
    let f = files();
    let mut b = real_bringup(&f, None);
    drive(&mut b);

    assert!(b.is_complete());
    assert_eq!(b.fault(), None);

    let ctx = b.context_mut();
    assert_eq!(ctx.date_version, Some(0x2025_0612));
    assert_eq!(ctx.rxclk_phase, Some(5));
    assert_eq!(ctx.eye, Some(EyeCenter { delay: 180, offset: 2 }));
    assert_eq!(ctx.board.read_reg(link::IDELAY).unwrap(), 180);
    assert_eq!(ctx.board.read_reg(link::OFFSET).unwrap(), 2);
    // Lock requested; training switched on and back off.
    assert_eq!(ctx.board.read_reg(link::CTRL).unwrap(), link::LOCK);
    // Sample clock enabled, PLL out of reset.
    assert_eq!(ctx.board.read_reg(regs::CLOCK_CTRL).unwrap() & 1, 1);
    assert_eq!(
        ctx.board.read_reg(regs::PLL_CTRL).unwrap() & (1 << regs::PLL_RESET_BIT),
        0
    );
    assert_eq!(ctx.clock_reset.levels, [true, false]);
}

#[test]
fn clock_chip_sees_reinit_then_dump() {
    let f = files();
    let mut b = real_bringup(&f, Some(StateId::EnableClock));
    drive(&mut b);
    assert_eq!(b.state(), StateId::EnableClock);

    let lmk = std::mem::replace(&mut b.context_mut().clock, Lmk0461x::new(LockedSpi::default()));
    let sent = lmk.into_inner().sent;
    assert_eq!(
        sent,
        [
            [0x01, 0x41, 0x04],
            [0x01, 0x42, 0x30],
            [0x00, 0x11, 0x00],
            [0x00, 0x00, 0x10],
            [0x00, 0x14, 0x18],
            [0x00, 0x85, 0x00],
            [0x00, 0xF6, 0x02],
            [0x00, 0x11, 0x01],
            [0x00, 0xAD, 0x30],
            [0x00, 0xAD, 0x00],
            [0x80, 0xBE, 0x00],
        ]
    );
}

#[test]
fn halt_point_can_be_moved_while_parked() {
    let f = files();
    let mut b = real_bringup(&f, Some(StateId::LocateEye));
    drive(&mut b);
    assert_eq!(b.state(), StateId::LocateEye);
    assert!(!b.is_complete());
    assert_eq!(b.context().eye, None);

    b.set_end_state(Some(StateId::EnableTrain));
    drive(&mut b);
    assert_eq!(b.state(), StateId::EnableTrain);
    assert!(b.context().eye.is_some());

    b.set_end_state(None);
    drive(&mut b);
    assert!(b.is_complete());
}

#[test]
fn slow_link_partner_is_waited_for() {
    let mut board = MockBoard::default();
    board.regs.insert(regs::ID, regs::BOARD_ID);
    board.regs.insert(regs::CLOCK_CTRL, 1 << regs::RACKCLK_READY_BIT);
    board.regs.insert(regs::PLL_CTRL, 1 << regs::PLL_LOCKED_BIT);
    board.trained = true;

    let f = files();
    let ctx = BringupContext::new(
        board,
        Lmk0461x::new(LockedSpi::default()),
        RecordingPin::default(),
        f.clock.path().to_path_buf(),
    );
    let mut b = Bringup::new(ctx, None);

    for _ in 0..50 {
        b.run().unwrap();
    }
    assert_eq!(b.state(), StateId::WaitLinkLocked);

    b.context_mut().board.link_locked = true;
    drive(&mut b);
    assert!(b.is_complete());
}

#[test]
fn wrong_firmware_parks_in_failure() {
    let f = files();
    let mut b = real_bringup(&f, None);
    b.context_mut().board.write_reg(regs::ID, 0xDEAD_BEEF).unwrap();
    drive(&mut b);

    assert_eq!(b.state(), StateId::Failure);
    assert_eq!(b.fault(), Some(BringupFault::IdentityMismatch(0xDEAD_BEEF)));
    assert!(!b.is_complete());
    assert!(b.context().clock_reset.levels.is_empty());
}
