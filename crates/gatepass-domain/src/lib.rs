//! Domain types shared across gatepass crates.
//!
//! This crate contains only pure types with no framework dependencies.
//! Import in `usecase/` and `domain/` layers; adapters translate wire formats into these.

pub mod assignment;
pub mod event;
pub mod id;
pub mod membership;
