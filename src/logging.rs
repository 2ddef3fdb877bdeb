//! Dual-stream logging setup (part of C12).
//!
//! Grounded on `scanner/runner.py::_setup_logging`'s three handlers (main file, a keyword-filtered
//! opportunities file, and console) and `_OppsFilter`'s MATCH/PAIR/ARB OPPORTUNITY/SCAN
//! CYCLE/MARKET REFRESH keyword routing. Re-expressed as a `tracing_subscriber` fmt layer filtered
//! on the `opportunities` target (set explicitly at each call site in `finder.rs`/`runner.rs`)
//! rather than a string-keyword scan over the rendered message, since every call site already
//! knows whether it's opportunity-relevant.

use std::path::Path;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initializes global tracing: one layer writes everything (gated by `RUST_LOG`, default `info`)
/// to stdout and `main_log_path`; a second layer writes only `target: "opportunities"` events to
/// `opportunities_log_path`, mirroring the source's separate eyeball-friendly opportunities feed.
pub fn init(main_log_path: &Path, opportunities_log_path: &Path) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let main_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(main_log_path)?;
    let opps_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(opportunities_log_path)?;

    let main_layer = fmt::layer()
        .with_writer(std::io::stdout.and(main_file))
        .with_target(true);

    let opportunities_layer = fmt::layer()
        .with_writer(opps_file)
        .with_target(false)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            metadata.target() == "opportunities"
        }));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(main_layer)
        .with(opportunities_layer)
        .try_init()?;

    Ok(())
}
