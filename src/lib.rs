//! Library entrypoint for jornada-engine.
//!
//! Exposes all modules so integration tests can import them.

pub mod config;
pub mod data;
pub mod engine;
pub mod errors;
pub mod league;
pub mod scoring;
pub mod settlement;
