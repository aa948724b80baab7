//! Application core.
//!
//! [`daemon`] ties the housekeeping engine, the bring-up sequence and the
//! link together as scheduler callbacks.  All interaction with the board
//! happens through the **port traits** in [`ports`], keeping both layers
//! testable without real peripherals.

pub mod daemon;
pub mod ports;
