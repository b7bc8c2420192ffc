pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod router;
pub mod usecase;
pub mod worker;
