//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a subsystem against
//! simulated lines and mock engine adapters. All tests run on the host
//! with no real hardware required.

#![cfg(not(target_os = "espidf"))]

mod dispatch_tests;
mod lifecycle_tests;
mod mock_hw;
