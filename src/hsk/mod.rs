//! Housekeeping protocol stack.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Housekeeping Stack                       │
//! │                                                              │
//! │  hsk-io thread                         main loop             │
//! │  ┌───────────┐   ┌─────────┐   ┌────────────┐   ┌─────────┐  │
//! │  │ Transport │──▶│  Codec  │──▶│ PacketQueue│──▶│ Engine  │  │
//! │  │  (read)   │   │ COBS+ck │   │  + wake    │   │ (table) │  │
//! │  └───────────┘   └─────────┘   └────────────┘   └─────────┘  │
//! │                                                      │       │
//! │  ┌───────────┐   ┌─────────┐                         │       │
//! │  │ Transport │◀──│  Codec  │◀── LinkWriter ◀─────────┘       │
//! │  │  (write)  │   │ encode  │                                 │
//! │  └───────────┘   └─────────┘                                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod channels;
pub mod codec;
pub mod engine;
pub mod handlers;
pub mod io_task;
pub mod packet;
pub mod restart;
pub mod transport;
