//! # cx_app
//!
//! Shared utilities for throttler tooling

pub mod cli;
pub mod config_loader;
pub mod simulation;
pub mod tracing_setup;
