//! Cross-venue prediction-market arbitrage engine.
//!
//! Exposes the full pipeline for use by the CLI binary and integration tests.

pub mod config;
pub mod error;
pub mod executor;
pub mod finder;
pub mod logging;
pub mod market;
pub mod matcher;
pub mod paper;
pub mod persistence;
pub mod runner;
pub mod schedule;
pub mod sizing;
pub mod venues;
