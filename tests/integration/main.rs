//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one layer of the hub
//! against the simulated badge in `sim_badge`. Everything runs on the host
//! with no radio required.

mod download_tests;
mod fleet_tests;
