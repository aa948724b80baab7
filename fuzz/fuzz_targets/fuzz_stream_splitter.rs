//! Fuzz target: `FrameSplitter` feeding the ingress stage
//!
//! Streams arbitrary bytes, split at a fuzzer-chosen chunk size, through
//! the splitter and `Ingress`, and checks the bookkeeping: every frame is
//! accounted for exactly once and the queue never exceeds its depth.
//!
//! cargo fuzz run fuzz_stream_splitter

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use surfhskd::hsk::channels::{PacketQueue, QUEUE_DEPTH, Statistics};
use surfhskd::hsk::codec::{FrameSplitter, MAX_WIRE_FRAME};
use surfhskd::hsk::io_task::{Ingress, address_filter};

fuzz_target!(|input: (u8, Vec<u8>)| {
    let (chunk, data) = input;
    let chunk = usize::from(chunk.max(1));

    let queue = Arc::new(PacketQueue::new());
    let stats = Arc::new(Statistics::new());
    let (wake_tx, _wake_rx) = crossbeam_channel::unbounded();
    let mut ingress = Ingress::new(queue.clone(), stats.clone(), address_filter(0x80), wake_tx);

    let mut splitter = FrameSplitter::new();
    let mut frames = 0u32;
    for piece in data.chunks(chunk) {
        splitter.feed(piece, |f| {
            frames += 1;
            assert!(ingress.handle_frame(f));
        });
        assert!(splitter.pending() <= MAX_WIRE_FRAME);
    }

    let c = stats.snapshot();
    assert_eq!(c.received + c.error + c.dropped + c.filtered, frames);
    assert!(queue.len() <= QUEUE_DEPTH);
});
