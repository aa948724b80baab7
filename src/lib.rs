//! SoC digitizer housekeeping daemon library.
//!
//! Exposes the daemon's building blocks for the binary, the integration
//! tests and the fuzz targets.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod fsm;
pub mod hsk;
pub mod scheduler;
