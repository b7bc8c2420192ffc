//! Test utilities for gatepass crates.
//!
//! Provides the golden fixture loader and an in-process HTTP mock server.
//! Import in `#[cfg(test)]` blocks and `tests/` only, never in production code.

pub mod fixture;
pub mod server;
