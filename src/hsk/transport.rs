//! Link abstraction: any byte channel that carries housekeeping frames.
//!
//! Concrete implementations live in `adapters`:
//! - serial UART (`adapters::serial`)
//! - UDP datagrams (`adapters::udp`)
//!
//! The I/O thread and the reply path are generic over `Transport`, so a
//! new link needs no changes to the codec or dispatch logic.

use crate::error::TransportError;

/// How frame boundaries arrive on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Byte stream; frames are split on the zero delimiter.
    Stream,
    /// Each read returns exactly one frame.
    Datagram,
}

/// Byte-oriented link.
pub trait Transport: Send {
    fn framing(&self) -> Framing;

    /// Read into `buf`.  Blocks for at most the link's poll timeout and
    /// returns `Ok(0)` when nothing arrived in that window.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write all of `data`.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    fn flush(&mut self) -> Result<(), TransportError>;

    /// Second handle on the same link, so reads and writes can live on
    /// different threads.
    fn try_clone(&self) -> Result<Box<dyn Transport>, TransportError>;
}
