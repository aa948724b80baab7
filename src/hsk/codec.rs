//! COBS frame codec.
//!
//! Wire format:
//! ```text
//! ┌───────────────────────────────────────────┬──────┐
//! │ COBS( src dest cmd len data.. checksum )  │ 0x00 │
//! └───────────────────────────────────────────┴──────┘
//! ```
//!
//! Stuffing guarantees the only zero on the wire is the terminator, so a
//! stream receiver resynchronises at the next zero after any corruption.
//! [`FrameSplitter`] handles arbitrary read boundaries: a single read may
//! carry part of a frame or several frames back to back.

use heapless::Vec;

use super::packet::{HEADER_LEN, MAX_FRAME, MIN_FRAME, Packet, checksum};
use crate::error::DecodeError;

/// Longest run COBS can express with one code byte.
const COBS_BLOCK: usize = 254;

/// Largest stuffed frame including the terminator.
pub const MAX_WIRE_FRAME: usize = MAX_FRAME + MAX_FRAME / COBS_BLOCK + 2;

/// Encoded frame ready to write to a link.
pub type WireFrame = Vec<u8, MAX_WIRE_FRAME>;

// ── Encode ───────────────────────────────────────────────────

/// Serialise, stuff and terminate a packet.
pub fn encode(pkt: &Packet) -> WireFrame {
    let mut raw: Vec<u8, MAX_FRAME> = Vec::new();
    // Packet data is capped at MAX_DATA, so the raw frame always fits.
    let _ = raw.extend_from_slice(&[pkt.src, pkt.dest, pkt.cmd, pkt.data.len() as u8]);
    let _ = raw.extend_from_slice(&pkt.data);
    let _ = raw.push(pkt.checksum());

    let mut out = WireFrame::new();
    cobs_encode(&raw, &mut out);
    let _ = out.push(0);
    out
}

fn cobs_encode(src: &[u8], out: &mut WireFrame) {
    let mut segments = src.split(|b| *b == 0).peekable();
    while let Some(mut seg) = segments.next() {
        let last = segments.peek().is_none();
        loop {
            let n = seg.len().min(COBS_BLOCK);
            let _ = out.push(n as u8 + 1);
            let _ = out.extend_from_slice(&seg[..n]);
            seg = &seg[n..];
            // A full block carries no implied zero; an exhausted final
            // segment needs no trailing empty group.
            if n < COBS_BLOCK || (seg.is_empty() && last) {
                break;
            }
        }
    }
}

// ── Decode ───────────────────────────────────────────────────

/// Unstuff and validate one frame.
///
/// Trailing terminators are ignored.  The result is one of the
/// [`DecodeError`] variants for any malformed input; this never panics.
pub fn decode(frame: &[u8]) -> Result<Packet, DecodeError> {
    let end = frame.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    let mut raw: Vec<u8, MAX_FRAME> = Vec::new();
    cobs_decode(&frame[..end], &mut raw)?;

    if raw.len() < MIN_FRAME {
        return Err(DecodeError::TooShort);
    }

    let body = &raw[HEADER_LEN..];
    let data = &body[..body.len() - 1];
    if raw[3] as usize != data.len() {
        return Err(DecodeError::Checksum);
    }
    if checksum(body) != 0 {
        return Err(DecodeError::Checksum);
    }

    Packet::new(raw[0], raw[1], raw[2], data).ok_or(DecodeError::Oversized)
}

fn cobs_decode(src: &[u8], out: &mut Vec<u8, MAX_FRAME>) -> Result<(), DecodeError> {
    let mut i = 0;
    while i < src.len() {
        let code = src[i];
        if code == 0 {
            return Err(DecodeError::Cobs);
        }
        i += 1;

        let n = code as usize - 1;
        let block = src.get(i..i + n).ok_or(DecodeError::Cobs)?;
        if block.contains(&0) {
            return Err(DecodeError::Cobs);
        }
        out.extend_from_slice(block)
            .map_err(|_| DecodeError::Oversized)?;
        i += n;

        if code as usize <= COBS_BLOCK && i < src.len() {
            out.push(0).map_err(|_| DecodeError::Oversized)?;
        }
    }
    Ok(())
}

// ── Stream splitter ──────────────────────────────────────────

/// Accumulates stream bytes and yields zero-delimited frames.
pub struct FrameSplitter {
    buf: Vec<u8, MAX_WIRE_FRAME>,
    overflow: bool,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            overflow: false,
        }
    }

    /// Feed bytes from one read.
    ///
    /// `on_frame` receives each complete frame (without its terminator),
    /// or `Err(Oversized)` once for a run that outgrew the buffer.  Empty
    /// frames from back-to-back delimiters are skipped.
    pub fn feed<F>(&mut self, data: &[u8], mut on_frame: F)
    where
        F: FnMut(Result<&[u8], DecodeError>),
    {
        for &b in data {
            if b == 0 {
                if self.overflow {
                    on_frame(Err(DecodeError::Oversized));
                } else if !self.buf.is_empty() {
                    on_frame(Ok(&self.buf));
                }
                self.reset();
            } else if !self.overflow && self.buf.push(b).is_err() {
                self.overflow = true;
            }
        }
    }

    /// Bytes currently buffered toward the next frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Discard partial data (e.g. after the link reopens).
    pub fn reset(&mut self) {
        self.buf.clear();
        self.overflow = false;
    }
}

impl Default for FrameSplitter {
    fn default() -> Self {
        Self::new()
    }
}
