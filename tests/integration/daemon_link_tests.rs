//! The whole daemon over a loopback UDP link: reader thread, queue,
//! scheduler, engine and reply path.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, unbounded};

use surfhskd::adapters::udp::UdpLink;
use surfhskd::app::daemon::{Daemon, ExitReason};
use surfhskd::fsm::context::BringupContext;
use surfhskd::fsm::{Bringup, StateId};
use surfhskd::hsk::channels::{PacketQueue, Statistics};
use surfhskd::hsk::codec::{decode, encode};
use surfhskd::hsk::engine::HskEngine;
use surfhskd::hsk::io_task::{self, Ingress, LinkWriter, address_filter};
use surfhskd::hsk::packet::{Packet, addr, opcode};
use surfhskd::hsk::transport::Transport;
use surfhskd::scheduler::{Control, Scheduler};

use crate::mock_hw::{MockBoard, MockClock, MockPlatform, RecordingPin};

const ME: u8 = 0x81;

type D = Daemon<MockBoard, MockClock, RecordingPin>;

static TICKS: AtomicU32 = AtomicU32::new(0);

/// Stop the run if the link test stalls.
fn watchdog(d: &mut D, ctl: &mut Control<D>) -> anyhow::Result<()> {
    d.on_tick(ctl)?;
    if TICKS.fetch_add(1, Ordering::Relaxed) > 500 {
        ctl.terminate();
    }
    Ok(())
}

struct Rig {
    daemon_addr: SocketAddr,
    console: UdpSocket,
    stats: Arc<Statistics>,
    queue: Arc<PacketQueue>,
    wake_rx: Receiver<u8>,
    stop: Arc<AtomicBool>,
    io: JoinHandle<()>,
    d: D,
    _clock_file: tempfile::NamedTempFile,
}

fn rig() -> Rig {
    let link = UdpLink::bind("127.0.0.1:0", None).unwrap();
    let daemon_addr = link.local_addr().unwrap();
    let console = UdpSocket::bind("127.0.0.1:0").unwrap();
    console.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let stats = Arc::new(Statistics::new());
    let queue = Arc::new(PacketQueue::new());
    let (wake_tx, wake_rx) = unbounded();
    let stop = Arc::new(AtomicBool::new(false));
    let writer = link.try_clone().unwrap();
    let ingress = Ingress::new(queue.clone(), stats.clone(), address_filter(ME), wake_tx);
    let io = io_task::spawn(Box::new(link), ingress, stop.clone()).unwrap();

    let platform = MockPlatform::default();
    let clock_file = tempfile::NamedTempFile::new().unwrap();
    let ctx = BringupContext::new(
        MockBoard::default(),
        MockClock::default(),
        RecordingPin::default(),
        clock_file.path().to_path_buf(),
    );
    let d: D = Daemon::new(
        HskEngine::new(ME, platform.services(), stats.clone()),
        Bringup::new(ctx, Some(StateId::Begin)),
        queue.clone(),
        LinkWriter::new(writer, stats.clone()),
        stats.clone(),
    );
    Rig {
        daemon_addr,
        console,
        stats,
        queue,
        wake_rx,
        stop,
        io,
        d,
        _clock_file: clock_file,
    }
}

#[test]
fn console_traffic_is_answered_until_restart() {
    let Rig {
        daemon_addr,
        console,
        stats,
        wake_rx,
        stop,
        io,
        mut d,
        ..
    } = rig();

    let send = |p: &Packet| console.send_to(&encode(p), daemon_addr).unwrap();
    send(&Packet::new(addr::CONSOLE, ME, opcode::PING, b"abc").unwrap());
    // Garbage datagram: counted as an error.
    console.send_to(&[0x05, 0x01, 0x02, 0x00], daemon_addr).unwrap();
    // Someone else's packet: filtered, never answered.
    send(&Packet::empty(addr::CONSOLE, 0x90, opcode::PING));
    send(&Packet::empty(addr::CONSOLE, ME, opcode::STATISTICS));
    send(&Packet::new(addr::CONSOLE, ME, opcode::RESTART, &[0x01]).unwrap());

    let (_sig_tx, sig_rx) = unbounded::<u8>();
    let mut sched = Scheduler::new();
    sched.add_wake_source("link", wake_rx, D::on_packet);
    sched.add_wake_source("signal", sig_rx, D::on_signal);
    sched.add_timer(Duration::from_millis(10), watchdog);
    let summary = sched.run(&mut d);

    let mut replies = Vec::new();
    let mut buf = [0u8; 600];
    for _ in 0..3 {
        let (n, _) = console.recv_from(&mut buf).unwrap();
        replies.push(decode(&buf[..n]).unwrap());
    }

    assert_eq!(replies[0].cmd, opcode::PING);
    assert_eq!(replies[0].data[..], *b"abc");
    assert_eq!((replies[0].src, replies[0].dest), (ME, addr::CONSOLE));
    // Everything ahead of it on the wire has been counted by now.
    assert_eq!(replies[1].cmd, opcode::STATISTICS);
    let &[received, sent, error, dropped, filtered] = &replies[1].data[..] else {
        panic!("statistics reply is {} bytes", replies[1].data.len());
    };
    assert!(received >= 2);
    assert_eq!((sent, error, dropped, filtered), (1, 1, 0, 1));
    assert_eq!(replies[2].cmd, opcode::RESTART);

    assert!(!summary.failed);
    assert!(matches!(d.exit_reason(), Some(ExitReason::Restart(_))));
    assert_eq!(d.finish(&summary), 0x01);

    stop.store(true, Ordering::Relaxed);
    io.join().unwrap();
    let c = stats.snapshot();
    assert_eq!((c.received, c.sent), (3, 3));
}

#[test]
fn unknown_opcode_only_bumps_received() {
    let Rig {
        daemon_addr,
        console,
        stats,
        queue,
        wake_rx,
        stop,
        io,
        mut d,
        ..
    } = rig();

    let pkt = Packet::new(addr::CONSOLE, ME, 0x42, &[1, 2]).unwrap();
    console.send_to(&encode(&pkt), daemon_addr).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while wake_rx.is_empty() {
        assert!(Instant::now() < deadline, "datagram never reached the reader");
        std::thread::sleep(Duration::from_millis(5));
    }

    // The link source is registered ahead of the signal, so the packet is
    // dispatched before the signal stops the loop.
    let (sig_tx, sig_rx) = unbounded();
    sig_tx.send(15).unwrap();
    let mut sched = Scheduler::new();
    Daemon::install(&mut sched, wake_rx, sig_rx, Duration::from_secs(60));
    let summary = sched.run(&mut d);

    assert!(queue.is_empty());
    assert_eq!(d.finish(&summary), 0);
    assert_eq!(stats.snapshot().to_wire(), [1, 0, 0, 0, 0]);
    console
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let mut buf = [0u8; 600];
    assert!(console.recv_from(&mut buf).is_err(), "unknown opcode was answered");

    stop.store(true, Ordering::Relaxed);
    io.join().unwrap();
}
