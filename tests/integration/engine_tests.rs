//! Command dispatch through `HskEngine` with mock platform services.

use std::sync::Arc;

use surfhskd::app::ports::FirmwareSlot;
use surfhskd::fsm::{StartupControl, StateId};
use surfhskd::hsk::channels::{Counter, Statistics};
use surfhskd::hsk::engine::HskEngine;
use surfhskd::hsk::packet::{Packet, addr, opcode};
use surfhskd::hsk::restart::RestartCode;

use crate::mock_hw::MockPlatform;

const ME: u8 = 0x82;

/// Bring-up stand-in: fixed current state, settable halt point.
struct Startup {
    state: StateId,
    end: Option<StateId>,
}

impl StartupControl for Startup {
    fn state(&self) -> StateId {
        self.state
    }
    fn end_state(&self) -> Option<StateId> {
        self.end
    }
    fn set_end_state(&mut self, end: Option<StateId>) {
        self.end = end;
    }
}

struct Rig {
    engine: HskEngine,
    platform: MockPlatform,
    stats: Arc<Statistics>,
    startup: Startup,
}

fn rig() -> Rig {
    let platform = MockPlatform::default();
    let stats = Arc::new(Statistics::new());
    Rig {
        engine: HskEngine::new(ME, platform.services(), stats.clone()),
        platform,
        stats,
        startup: Startup {
            state: StateId::WaitPllLock,
            end: None,
        },
    }
}

impl Rig {
    fn send(&mut self, cmd: u8, data: &[u8]) -> Option<Packet> {
        let pkt = Packet::new(addr::CONSOLE, ME, cmd, data).unwrap();
        self.engine.dispatch(&pkt, &mut self.startup).unwrap()
    }

    fn ok(&mut self, cmd: u8, data: &[u8]) -> Vec<u8> {
        let r = self.send(cmd, data).expect("reply");
        assert_eq!((r.src, r.dest, r.cmd), (ME, addr::CONSOLE, cmd));
        r.data.to_vec()
    }

    fn refused(&mut self, cmd: u8, data: &[u8]) -> Vec<u8> {
        let r = self.send(cmd, data).expect("reply");
        assert_eq!(r.cmd, opcode::ERROR, "command {:#04x} was accepted", cmd);
        r.data.to_vec()
    }
}

// ── Telemetry ─────────────────────────────────────────────────

#[test]
fn ping_echoes_payload() {
    let mut r = rig();
    assert_eq!(r.ok(opcode::PING, b"hello"), b"hello");
    assert!(r.ok(opcode::PING, &[]).is_empty());
}

#[test]
fn statistics_reports_counters_in_wire_order() {
    let mut r = rig();
    for _ in 0..3 {
        r.stats.count(Counter::Received);
    }
    r.stats.count(Counter::Filtered);
    assert_eq!(r.ok(opcode::STATISTICS, &[]), [3, 0, 0, 0, 1]);
}

#[test]
fn sensors_are_big_endian_words() {
    let mut r = rig();
    assert_eq!(r.ok(opcode::TEMPS, &[]), [0x0A, 0x00, 0x0B, 0x00]);
    assert_eq!(
        r.ok(opcode::VOLTS, &[]),
        [0, 10, 0, 20, 0, 30, 0, 40, 0, 50, 0, 60]
    );
}

#[test]
fn identify_lists_fields_then_location() {
    let mut r = rig();
    let mut expected = b"400000000128a0c52c404085\x0000:0a:35:00:01:22\x000.1.7\x000.3.0\x00".to_vec();
    expected.extend_from_slice(b"BR\x02");
    assert_eq!(r.ok(opcode::IDENTIFY, &[]), expected);

    r.platform.0.borrow_mut().location = None;
    let reply = r.ok(opcode::IDENTIFY, &[]);
    assert_eq!(reply.last(), Some(&0));
}

// ── Dispatch rules ────────────────────────────────────────────

#[test]
fn unknown_and_reserved_opcodes_are_silent() {
    let mut r = rig();
    assert!(r.send(0x42, &[]).is_none());
    assert!(r.send(opcode::FW_PARAMS, &[1, 2]).is_none());
}

#[test]
fn start_state_sets_and_clears_halt_point() {
    let mut r = rig();
    let cur = StateId::WaitPllLock.as_u8();

    assert_eq!(r.ok(opcode::START_STATE, &[]), [cur]);
    assert_eq!(r.ok(opcode::START_STATE, &[StateId::LocateEye.as_u8()]), [cur]);
    assert_eq!(r.startup.end_state(), Some(StateId::LocateEye));

    assert_eq!(r.ok(opcode::START_STATE, &[0xFF]), [cur]);
    assert_eq!(r.startup.end_state(), None);

    assert_eq!(r.refused(opcode::START_STATE, &[0x40]), [0x40]);
    assert_eq!(r.startup.end_state(), None);
}

// ── Firmware slots ────────────────────────────────────────────

#[test]
fn firmware_links_set_query_and_clear() {
    let mut r = rig();
    r.platform.add_file("/lib/firmware/surf_0_3_0.bit");

    assert_eq!(r.ok(opcode::FW_NEXT, &[]), [0]);
    assert_eq!(
        r.ok(opcode::FW_NEXT, b"/lib/firmware/surf_0_3_0.bit"),
        b"/lib/firmware/surf_0_3_0.bit\x00"
    );
    assert_eq!(
        r.platform.link(FirmwareSlot::NextFirmware).unwrap().to_str(),
        Some("/lib/firmware/surf_0_3_0.bit")
    );
    assert_eq!(r.ok(opcode::FW_NEXT, &[0]), [0]);
    assert!(r.platform.link(FirmwareSlot::NextFirmware).is_none());
}

#[test]
fn missing_link_target_is_refused() {
    let mut r = rig();
    assert!(r.refused(opcode::SOFT_NEXT, b"/nope.tar").is_empty());
    assert!(r.platform.link(FirmwareSlot::NextSoftware).is_none());
    assert_eq!(r.engine.pending_restart(), None);
}

#[test]
fn soft_next_reboot_restarts_only_on_success() {
    let mut r = rig();
    r.refused(opcode::SOFT_NEXT_REBOOT, b"/nope.tar");
    assert_eq!(r.engine.pending_restart(), None);

    r.platform.add_file("/home/root/pysoc.tar");
    r.ok(opcode::SOFT_NEXT_REBOOT, b"/home/root/pysoc.tar");
    assert_eq!(r.engine.pending_restart(), Some(RestartCode::NORMAL));
}

// ── Journal ───────────────────────────────────────────────────

#[test]
fn journal_is_paged_out_one_packet_at_a_time() {
    let mut r = rig();
    r.platform.0.borrow_mut().journal = vec![b'x'; 300];

    assert_eq!(r.ok(opcode::JOURNAL, b"-u pyfwupd -n 20").len(), 255);
    assert_eq!(
        r.platform.0.borrow().journal_queries[0],
        ["-u", "pyfwupd", "-n", "20"]
    );
    assert_eq!(r.ok(opcode::JOURNAL, &[]).len(), 45);
    assert!(r.ok(opcode::JOURNAL, &[]).is_empty());
    assert_eq!(r.platform.0.borrow().journal_queries.len(), 1);
}

// ── Download mode and restart ─────────────────────────────────

#[test]
fn download_mode_is_undone_on_shutdown() {
    let mut r = rig();
    assert_eq!(r.ok(opcode::DOWNLOAD_MODE, &[]), [0]);
    assert_eq!(r.ok(opcode::DOWNLOAD_MODE, &[1]), [1]);
    assert_eq!(r.refused(opcode::DOWNLOAD_MODE, &[7]), [7]);

    r.engine.shutdown().unwrap();
    let p = r.platform.0.borrow();
    assert!(!p.ingest_running);
    assert_eq!(p.ingest_stops, 1);
}

#[test]
fn restart_codes_are_validated() {
    let mut r = rig();
    assert_eq!(r.refused(opcode::RESTART, &[]), b"");
    assert_eq!(r.refused(opcode::RESTART, &[1, 2]), [1, 2]);
    assert_eq!(r.refused(opcode::RESTART, &[0x40]), [0x40]);
    assert_eq!(r.engine.pending_restart(), None);

    r.platform
        .0
        .borrow_mut()
        .links
        .insert(FirmwareSlot::CurrentFirmware, "/lib/firmware/good.bit".into());

    assert_eq!(r.ok(opcode::RESTART, &[0x0C]), [0x0C]);
    assert_eq!(r.engine.pending_restart().map(RestartCode::exit_code), Some(0x0C));
    assert!(r.platform.link(FirmwareSlot::CurrentFirmware).is_none());
}
