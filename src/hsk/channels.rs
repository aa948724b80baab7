//! Shared state between the link I/O thread and the main loop.
//!
//! Uses an `embassy-sync` bounded channel for decoded packets and a
//! blocking mutex for traffic counters.  Nothing else crosses the
//! thread boundary.
//!
//! ```text
//! ┌──────────────┐   Packet    ┌──────────────┐
//! │  I/O thread  │────────────▶│  Main loop   │
//! │  (decode)    │ PacketQueue │  (dispatch)  │
//! └──────┬───────┘             └──────┬───────┘
//!        │        Statistics          │
//!        └───────────▶ ◀──────────────┘
//! ```

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use super::packet::Packet;

/// Depth of the inbound packet queue.
pub const QUEUE_DEPTH: usize = 16;

// ── Packet queue ─────────────────────────────────────────────

/// Bounded FIFO of accepted packets, I/O thread → main loop.
pub struct PacketQueue<const N: usize = QUEUE_DEPTH> {
    inner: Channel<CriticalSectionRawMutex, Packet, N>,
}

impl<const N: usize> PacketQueue<N> {
    pub const fn new() -> Self {
        Self {
            inner: Channel::new(),
        }
    }

    /// Enqueue without blocking.  Hands the packet back when full.
    pub fn try_push(&self, pkt: Packet) -> Result<(), Packet> {
        self.inner.try_send(pkt).map_err(|e| match e {
            embassy_sync::channel::TrySendError::Full(p) => p,
        })
    }

    pub fn try_pop(&self) -> Option<Packet> {
        self.inner.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Discard everything queued; returns how many were dropped.
    pub fn drain(&self) -> usize {
        let mut n = 0;
        while self.try_pop().is_some() {
            n += 1;
        }
        n
    }
}

impl<const N: usize> Default for PacketQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Traffic statistics ───────────────────────────────────────

/// Raw counter values.  Wider than the wire so wrap only happens on report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub received: u32,
    pub sent: u32,
    pub error: u32,
    pub dropped: u32,
    pub filtered: u32,
}

impl Counters {
    /// Wire order: received, sent, error, dropped, filtered, each mod 256.
    pub fn to_wire(&self) -> [u8; 5] {
        [
            self.received as u8,
            self.sent as u8,
            self.error as u8,
            self.dropped as u8,
            self.filtered as u8,
        ]
    }
}

/// Selects one counter for [`Statistics::count`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Received,
    Sent,
    Error,
    Dropped,
    Filtered,
}

/// Five traffic counters under one lock.
pub struct Statistics {
    counters: Mutex<CriticalSectionRawMutex, Cell<Counters>>,
}

impl Statistics {
    pub const fn new() -> Self {
        Self {
            counters: Mutex::new(Cell::new(Counters {
                received: 0,
                sent: 0,
                error: 0,
                dropped: 0,
                filtered: 0,
            })),
        }
    }

    fn update(&self, f: impl FnOnce(&mut Counters)) -> Counters {
        self.counters.lock(|cell| {
            let mut c = cell.get();
            f(&mut c);
            cell.set(c);
            c
        })
    }

    pub fn count(&self, which: Counter) -> Counters {
        self.update(|c| {
            let slot = match which {
                Counter::Received => &mut c.received,
                Counter::Sent => &mut c.sent,
                Counter::Error => &mut c.error,
                Counter::Dropped => &mut c.dropped,
                Counter::Filtered => &mut c.filtered,
            };
            *slot = slot.wrapping_add(1);
        })
    }

    /// All five counters read in one critical section.
    pub fn snapshot(&self) -> Counters {
        self.counters.lock(Cell::get)
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}
