//! ETAS Aftershock Ensemble Core Library
//!
//! This library provides the core functionality for ETAS aftershock
//! forecasting:
//! - Catalog generation (seed source, branching engine, per-worker RNG)
//! - Ensemble accumulators (simulation ranging, seed estimate, time/magnitude)
//! - The multi-threaded ensemble generator
//! - Adaptive ranging of the simulation range
//! - Configuration, logging, progress events, and reports
//!
//! The binary entry point is in `main.rs`.

pub mod accum;
pub mod config;
pub mod engine;
pub mod ensemble;
pub mod events;
pub mod exit_codes;
pub mod logging;
pub mod random;
pub mod ranging;
pub mod report;

// Re-export test utilities for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
