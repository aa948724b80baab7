//! Error types for the housekeeping daemon.
//!
//! Wire and link failures are small `Copy` enums so the I/O thread can
//! count and log them without allocating.  Anything that should stop the
//! daemon (handler faults, bring-up hardware errors) travels as
//! `anyhow::Error` with context attached at the call site; these enums
//! convert into it through `std::error::Error`.

use core::fmt;

// ---------------------------------------------------------------------------
// Frame decoding
// ---------------------------------------------------------------------------

/// Why an inbound frame was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// COBS stuffing is malformed (bad code byte, overrun, embedded zero).
    Cobs,
    /// Unstuffed frame is shorter than the 5-byte minimum.
    TooShort,
    /// Data bytes plus checksum do not sum to zero, or the length byte
    /// disagrees with the data actually present.
    Checksum,
    /// The stream delivered more bytes than a frame can hold before a
    /// delimiter showed up.
    Oversized,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cobs => write!(f, "COBS decode error"),
            Self::TooShort => write!(f, "frame too short"),
            Self::Checksum => write!(f, "checksum mismatch"),
            Self::Oversized => write!(f, "frame exceeds maximum size"),
        }
    }
}

impl std::error::Error for DecodeError {}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Underlying OS I/O failure.
    Io(std::io::ErrorKind),
    /// The link has been closed and will not produce more data.
    Closed,
    /// Datagram link has nobody to reply to yet.
    NoPeer,
    /// Operation not supported by this transport.
    Unsupported,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(kind) => write!(f, "I/O error: {kind}"),
            Self::Closed => write!(f, "link closed"),
            Self::NoPeer => write!(f, "no peer address known"),
            Self::Unsupported => write!(f, "operation not supported"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::UnexpectedEof => Self::Closed,
            kind => Self::Io(kind),
        }
    }
}

impl From<serialport::Error> for TransportError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::Io(kind) => Self::Io(kind),
            serialport::ErrorKind::NoDevice => Self::Closed,
            _ => Self::Unsupported,
        }
    }
}

// ---------------------------------------------------------------------------
// Command-level errors (become 0xFF error replies, never fatal)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Referenced file or link target does not exist.
    NotFound,
    /// Argument byte(s) outside the accepted set.
    InvalidArgument,
    /// Collaborator could not service the request right now.
    Unavailable,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

impl std::error::Error for CommandError {}

// ---------------------------------------------------------------------------
// Bring-up faults (drive the state machine into Failure)
// ---------------------------------------------------------------------------

/// Conditions that park the bring-up sequence in `Failure`.  Hardware
/// I/O errors are not faults; they propagate and stop the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringupFault {
    /// Firmware identification register did not read back the board id.
    IdentityMismatch(u32),
    /// Clock chip configuration file is missing.
    ClockConfigMissing,
}

impl fmt::Display for BringupFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityMismatch(id) => write!(f, "firmware identity mismatch: {id:#010x}"),
            Self::ClockConfigMissing => write!(f, "clock configuration file missing"),
        }
    }
}

impl std::error::Error for BringupFault {}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds a value the daemon cannot run with.
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
