//! Shared utilities for stock-snapshot-rs
//!
//! This crate provides the pieces every binary in the workspace needs:
//! tracing setup and the process-level application configuration.

pub mod config;
pub mod logging;

pub use config::AppConfig;
pub use logging::init_tracing;
