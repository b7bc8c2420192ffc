//! Shared service plumbing for gatepass binaries: configuration, tracing, health.

pub mod config;
pub mod health;
pub mod tracing;
