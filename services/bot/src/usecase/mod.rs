pub mod allocate;
pub mod engine;
pub mod messages;
