//! Link I/O thread: bytes in, validated packets out.
//!
//! Runs on a dedicated thread so a slow command on the main loop never
//! stalls the link.  The thread only frames, decodes, filters and
//! enqueues; every decision about what a packet means happens on the
//! main loop.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────┐
//!  │  hsk-io thread                                           │
//!  │                                                          │
//!  │  read ─▶ split on 0x00 ─▶ decode ─▶ filter ─▶ try_push   │
//!  │                              │         │          │      │
//!  │                            error   filtered/   dropped   │
//!  │                                    rejected       │      │
//!  │                                                 wake ────┼──▶ main loop
//!  └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each inbound frame moves exactly one counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use log::{debug, error, info, warn};

use super::channels::{Counter, PacketQueue, Statistics};
use super::codec::{FrameSplitter, MAX_WIRE_FRAME, decode, encode};
use super::packet::Packet;
use super::transport::{Framing, Transport};
use crate::error::{DecodeError, TransportError};

const READ_BUF_SIZE: usize = 1024;

// ── Filtering ────────────────────────────────────────────────

/// Owner's verdict on a decoded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// Deliver to the main loop.
    Accept,
    /// Well-formed but not addressed to us.
    Filtered,
    /// Addressed to us but invalid; counted as an error.
    Rejected,
}

/// Standard address filter for a board answering to `my_id`.
///
/// A packet that claims to come from us is a looped-back frame and is
/// rejected rather than executed.
pub fn address_filter(my_id: u8) -> impl Fn(&Packet) -> FilterVerdict + Send + 'static {
    move |pkt| {
        if pkt.dest != my_id {
            FilterVerdict::Filtered
        } else if pkt.src == my_id {
            FilterVerdict::Rejected
        } else {
            FilterVerdict::Accept
        }
    }
}

// ── Ingress pipeline ─────────────────────────────────────────

/// Decode/filter/enqueue stage, independent of the read loop.
pub struct Ingress<F> {
    queue: Arc<PacketQueue>,
    stats: Arc<Statistics>,
    filter: F,
    wake: Sender<u8>,
    seq: u8,
}

impl<F> Ingress<F>
where
    F: Fn(&Packet) -> FilterVerdict,
{
    pub fn new(
        queue: Arc<PacketQueue>,
        stats: Arc<Statistics>,
        filter: F,
        wake: Sender<u8>,
    ) -> Self {
        Self {
            queue,
            stats,
            filter,
            wake,
            seq: 0,
        }
    }

    /// Handle one delimited frame.  Returns `false` once the main loop
    /// has gone away and the thread should stop.
    pub fn handle_frame(&mut self, frame: Result<&[u8], DecodeError>) -> bool {
        let pkt = match frame.and_then(decode) {
            Ok(pkt) => pkt,
            Err(e) => {
                let c = self.stats.count(Counter::Error);
                error!("IO: {} #{}", e, c.error);
                return true;
            }
        };

        match (self.filter)(&pkt) {
            FilterVerdict::Accept => {}
            FilterVerdict::Filtered => {
                self.stats.count(Counter::Filtered);
                debug!("IO: filtered {:02x}->{:02x} cmd {:02x}", pkt.src, pkt.dest, pkt.cmd);
                return true;
            }
            FilterVerdict::Rejected => {
                let c = self.stats.count(Counter::Error);
                error!(
                    "IO: filter rejected {:02x}->{:02x} cmd {:02x} #{}",
                    pkt.src, pkt.dest, pkt.cmd, c.error
                );
                return true;
            }
        }

        if self.queue.try_push(pkt).is_err() {
            let c = self.stats.count(Counter::Dropped);
            warn!("IO: packet queue full, dropped packet #{}", c.dropped);
            return true;
        }
        self.stats.count(Counter::Received);

        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        self.wake.send(seq).is_ok()
    }
}

// ── Read loop ────────────────────────────────────────────────

fn run_io_loop<F>(mut transport: Box<dyn Transport>, mut ingress: Ingress<F>, stop: &AtomicBool)
where
    F: Fn(&Packet) -> FilterVerdict,
{
    let framing = transport.framing();
    let mut splitter = FrameSplitter::new();
    let mut buf = [0u8; READ_BUF_SIZE];

    info!("IO: link reader started ({:?})", framing);
    while !stop.load(Ordering::Relaxed) {
        let n = match transport.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(TransportError::Closed) => {
                info!("IO: link closed");
                return;
            }
            Err(e) => {
                error!("IO: read failed: {}", e);
                return;
            }
        };

        let alive = match framing {
            Framing::Stream => {
                let mut alive = true;
                splitter.feed(&buf[..n], |frame| alive &= ingress.handle_frame(frame));
                alive
            }
            Framing::Datagram if n > MAX_WIRE_FRAME => {
                ingress.handle_frame(Err(DecodeError::Oversized))
            }
            Framing::Datagram => ingress.handle_frame(Ok(&buf[..n])),
        };
        if !alive {
            info!("IO: main loop gone, reader exiting");
            return;
        }
    }
    info!("IO: link reader stopped");
}

/// Spawn the link reader.  Dropping its wake sender on exit tells the
/// main loop the link is gone.
pub fn spawn<F>(
    transport: Box<dyn Transport>,
    ingress: Ingress<F>,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>>
where
    F: Fn(&Packet) -> FilterVerdict + Send + 'static,
{
    std::thread::Builder::new()
        .name("hsk-io".into())
        .spawn(move || run_io_loop(transport, ingress, &stop))
}

// ── Reply path ───────────────────────────────────────────────

/// Write side of the link, owned by the main loop.
pub struct LinkWriter {
    transport: Box<dyn Transport>,
    stats: Arc<Statistics>,
}

impl LinkWriter {
    pub fn new(transport: Box<dyn Transport>, stats: Arc<Statistics>) -> Self {
        Self { transport, stats }
    }

    /// Encode and write one packet.
    pub fn send(&mut self, pkt: &Packet) -> Result<(), TransportError> {
        self.stats.count(Counter::Sent);
        let wire = encode(pkt);
        self.transport.write(&wire)?;
        self.transport.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hsk::packet::{addr, opcode};
    use crossbeam_channel::unbounded;

    fn ingress_with(
        filter: impl Fn(&Packet) -> FilterVerdict,
    ) -> (
        Ingress<impl Fn(&Packet) -> FilterVerdict>,
        Arc<PacketQueue>,
        Arc<Statistics>,
        crossbeam_channel::Receiver<u8>,
    ) {
        let queue = Arc::new(PacketQueue::new());
        let stats = Arc::new(Statistics::new());
        let (tx, rx) = unbounded();
        (
            Ingress::new(queue.clone(), stats.clone(), filter, tx),
            queue,
            stats,
            rx,
        )
    }

    fn wire(src: u8, dest: u8) -> Vec<u8> {
        let mut w = encode(&Packet::empty(src, dest, opcode::PING)).to_vec();
        w.pop();
        w
    }

    #[test]
    fn accepted_packet_is_queued_and_wakes() {
        let (mut ing, queue, stats, rx) = ingress_with(address_filter(0x80));
        assert!(ing.handle_frame(Ok(&wire(addr::CONSOLE, 0x80))));
        assert_eq!(queue.len(), 1);
        assert_eq!(rx.try_recv(), Ok(0));
        assert_eq!(stats.snapshot().received, 1);
    }

    #[test]
    fn wrong_destination_is_filtered() {
        let (mut ing, queue, stats, rx) = ingress_with(address_filter(0x80));
        ing.handle_frame(Ok(&wire(addr::CONSOLE, 0x81)));
        assert!(queue.is_empty());
        assert!(rx.try_recv().is_err());
        let snap = stats.snapshot();
        assert_eq!((snap.filtered, snap.received), (1, 0));
    }

    #[test]
    fn looped_back_frame_is_rejected() {
        let (mut ing, queue, stats, _rx) = ingress_with(address_filter(0x80));
        ing.handle_frame(Ok(&wire(0x80, 0x80)));
        assert!(queue.is_empty());
        assert_eq!(stats.snapshot().error, 1);
    }

    #[test]
    fn decode_failure_counts_error() {
        let (mut ing, _queue, stats, _rx) = ingress_with(|_| FilterVerdict::Accept);
        ing.handle_frame(Ok(&[0x09, 0x01]));
        ing.handle_frame(Err(DecodeError::Oversized));
        assert_eq!(stats.snapshot().error, 2);
    }

    #[test]
    fn full_queue_counts_drop_without_wake() {
        let (mut ing, queue, stats, rx) = ingress_with(|_| FilterVerdict::Accept);
        for _ in 0..queue.capacity() {
            ing.handle_frame(Ok(&wire(addr::CONSOLE, 0x80)));
        }
        ing.handle_frame(Ok(&wire(addr::CONSOLE, 0x80)));
        let snap = stats.snapshot();
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.received as usize, queue.capacity());
        assert_eq!(rx.len(), queue.capacity());
    }

    #[test]
    fn wake_sequence_wraps() {
        let (mut ing, queue, _stats, rx) = ingress_with(|_| FilterVerdict::Accept);
        ing.seq = 0xFF;
        ing.handle_frame(Ok(&wire(addr::CONSOLE, 0x80)));
        queue.drain();
        ing.handle_frame(Ok(&wire(addr::CONSOLE, 0x80)));
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), [0xFF, 0x00]);
    }

    #[test]
    fn closed_main_loop_stops_ingress() {
        let (mut ing, _queue, _stats, rx) = ingress_with(|_| FilterVerdict::Accept);
        drop(rx);
        assert!(!ing.handle_frame(Ok(&wire(addr::CONSOLE, 0x80))));
    }
}
