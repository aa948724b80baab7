//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a subsystem through the
//! public API against mock adapters.  No real hardware is required.

mod bringup_flow_tests;
mod daemon_link_tests;
mod engine_tests;
mod mock_hw;
